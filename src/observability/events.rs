//! Observable engine events.
//!
//! Events are explicit and typed; the string form is what lands in the
//! `event` field of a log line.

use std::fmt;

use super::logger::Severity;

/// Observable events in the query engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration file loaded and validated
    ConfigLoaded,

    // Query lifecycle
    /// Transient query built from a descriptor
    QueryLookup,
    /// Query interned in the persisted store
    QuerySaved,
    /// Query re-hydrated from a token
    QueryResumed,
    /// SQL statement sent to the backend
    QueryExecuted,
    /// Backend returned an error
    QueryFailed,
    /// Query rejected during validation
    QueryRejected,

    // Coercion
    /// Query coerced to another model
    QueryCoerced,
    /// No coercion exists for the requested pair
    CoercionUnsupported,

    // Store
    /// Stale persisted queries deleted
    StoreCleanup,

    // Pattern search
    /// Free-text pattern parsed into terms
    PatternParsed,
    /// Free-text pattern rejected
    PatternRejected,
}

impl Event {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::QueryLookup => "QUERY_LOOKUP",
            Event::QuerySaved => "QUERY_SAVED",
            Event::QueryResumed => "QUERY_RESUMED",
            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::QueryFailed => "QUERY_FAILED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::QueryCoerced => "QUERY_COERCED",
            Event::CoercionUnsupported => "COERCION_UNSUPPORTED",
            Event::StoreCleanup => "STORE_CLEANUP",
            Event::PatternParsed => "PATTERN_PARSED",
            Event::PatternRejected => "PATTERN_REJECTED",
        }
    }

    /// Severity this event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::QueryExecuted | Event::QueryLookup => Severity::Trace,
            Event::QueryFailed => Severity::Error,
            Event::QueryRejected | Event::PatternRejected => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_screaming_snake() {
        let all = [
            Event::ConfigLoaded,
            Event::QueryLookup,
            Event::QuerySaved,
            Event::QueryResumed,
            Event::QueryExecuted,
            Event::QueryFailed,
            Event::QueryRejected,
            Event::QueryCoerced,
            Event::CoercionUnsupported,
            Event::StoreCleanup,
            Event::PatternParsed,
            Event::PatternRejected,
        ];
        for event in all {
            let s = event.as_str();
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'), "{}", s);
        }
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(Event::QueryExecuted.severity(), Severity::Trace);
        assert_eq!(Event::QueryFailed.severity(), Severity::Error);
        assert_eq!(Event::QuerySaved.severity(), Severity::Info);
    }
}
