//! JSON-lines logger
//!
//! Every line is one object: `event`, then `severity`, then the fields
//! sorted by key. Writes are synchronous. Lines under the process-wide
//! threshold are dropped before they are formatted. Warnings and worse go
//! to stderr; the rest go to stdout unless a command owns stdout.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Generated SQL and other per-statement detail
    Trace = 0,
    Info = 1,
    /// Rejected input
    Warn = 2,
    /// Backend or store failures
    Error = 3,
    Fatal = 4,
}

const LEVELS: [Severity; 5] = [
    Severity::Trace,
    Severity::Info,
    Severity::Warn,
    Severity::Error,
    Severity::Fatal,
];

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    /// Whether lines at this level go to stderr.
    fn is_problem(&self) -> bool {
        *self >= Severity::Warn
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        LEVELS
            .iter()
            .copied()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

static THRESHOLD: AtomicU8 = AtomicU8::new(Severity::Info as u8);
static ALL_TO_STDERR: AtomicBool = AtomicBool::new(false);

pub struct Logger;

impl Logger {
    /// Drop every line below `severity` from now on.
    pub fn set_min_severity(severity: Severity) {
        THRESHOLD.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        let raw = THRESHOLD.load(Ordering::Relaxed) as usize;
        LEVELS.get(raw).copied().unwrap_or(Severity::Fatal)
    }

    /// Send every line to stderr, for processes whose stdout is a
    /// machine-readable response.
    pub fn send_all_to_stderr() {
        ALL_TO_STDERR.store(true, Ordering::Relaxed);
    }

    fn goes_to_stderr(severity: Severity) -> bool {
        severity.is_problem() || ALL_TO_STDERR.load(Ordering::Relaxed)
    }

    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < Self::min_severity() {
            return;
        }
        let line = Self::format_line(severity, event, fields);
        // A log line that cannot be written is not worth failing a query over.
        let _ = if Self::goes_to_stderr(severity) {
            io::stderr().lock().write_all(line.as_bytes())
        } else {
            io::stdout().lock().write_all(line.as_bytes())
        };
    }

    /// One complete line, newline included.
    pub fn format_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut line = format!(
            "{{\"event\":{},\"severity\":\"{}\"",
            json_string(event),
            severity
        );
        for (key, value) in sorted {
            line.push(',');
            line.push_str(&json_string(key));
            line.push(':');
            line.push_str(&json_string(value));
        }
        line.push_str("}\n");
        line
    }
}

fn json_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_severity_ordering() {
        assert!(LEVELS.windows(2).all(|w| w[0] < w[1]));
        assert!(Severity::Warn.is_problem());
        assert!(!Severity::Info.is_problem());
    }

    #[test]
    fn test_stderr_routing() {
        assert!(Logger::goes_to_stderr(Severity::Error));
        Logger::send_all_to_stderr();
        assert!(Logger::goes_to_stderr(Severity::Info));
        assert!(Logger::goes_to_stderr(Severity::Trace));
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("trace".parse::<Severity>().unwrap(), Severity::Trace);
        assert_eq!(" Warn ".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn test_line_shape() {
        let line = Logger::format_line(Severity::Info, "QUERY_LOOKUP", &[("model", "Name")]);
        assert!(line.starts_with(r#"{"event":"QUERY_LOOKUP","severity":"INFO""#));
        assert_eq!(line.matches('\n').count(), 1);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["model"], "Name");
    }

    #[test]
    fn test_fields_sorted_by_key() {
        let a = Logger::format_line(Severity::Info, "X", &[("zebra", "1"), ("apple", "2"), ("mango", "3")]);
        let b = Logger::format_line(Severity::Info, "X", &[("mango", "3"), ("zebra", "1"), ("apple", "2")]);
        assert_eq!(a, b);
        assert!(a.find("apple") < a.find("mango"));
        assert!(a.find("mango") < a.find("zebra"));
    }

    #[test]
    fn test_sql_survives_escaping() {
        let sql = "SELECT DISTINCT names.id FROM `names` WHERE names.text_name LIKE \"A%\"\n";
        let line = Logger::format_line(Severity::Trace, "QUERY_EXECUTED", &[("sql", sql)]);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["sql"], sql);
    }
}
