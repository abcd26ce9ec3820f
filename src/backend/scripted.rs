//! In-memory scripted backend
//!
//! Answers SQL by substring rules and records every statement it saw. The
//! first rule whose needles all occur in the statement wins; statements no
//! rule matches return no rows.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{BackendError, BackendResult, Row, SqlBackend};

/// What a matching rule answers with.
#[derive(Debug, Clone, PartialEq)]
enum Answer {
    Rows(Vec<Row>),
    Fail(String),
}

/// A single substring-matching rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRule {
    needles: Vec<String>,
    answer: Answer,
}

impl ScriptRule {
    fn matches(&self, sql: &str) -> bool {
        self.needles.iter().all(|n| sql.contains(n.as_str()))
    }
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    rules: Vec<FixtureRule>,
}

#[derive(Debug, Deserialize)]
struct FixtureRule {
    contains: Vec<String>,
    #[serde(default)]
    rows: Vec<Map<String, Value>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedBackend {
    rules: Vec<ScriptRule>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing every needle with `rows`.
    pub fn rule(mut self, needles: &[&str], rows: Vec<Row>) -> Self {
        self.rules.push(ScriptRule {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            answer: Answer::Rows(rows),
        });
        self
    }

    /// Answer statements containing every needle with one `id` row per id.
    pub fn ids(self, needles: &[&str], ids: &[i64]) -> Self {
        let rows = ids.iter().map(|id| Row::new().with("id", *id)).collect();
        self.rule(needles, rows)
    }

    /// Fail statements containing every needle.
    pub fn fail(mut self, needles: &[&str], message: &str) -> Self {
        self.rules.push(ScriptRule {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            answer: Answer::Fail(message.to_string()),
        });
        self
    }

    /// Load rules from a JSON fixture:
    /// `{"rules": [{"contains": ["..."], "rows": [{"id": 1}], "error": null}]}`
    pub fn from_fixture(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            BackendError::Unavailable(format!("Failed to read fixture {}: {}", path.display(), e))
        })?;
        let fixture: FixtureFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::Unavailable(format!("Failed to parse fixture {}: {}", path.display(), e))
        })?;

        let mut backend = ScriptedBackend::new();
        for rule in fixture.rules {
            let answer = match rule.error {
                Some(message) => Answer::Fail(message),
                None => Answer::Rows(rule.rows.into_iter().map(Row::from).collect()),
            };
            backend.rules.push(ScriptRule {
                needles: rule.contains,
                answer,
            });
        }
        Ok(backend)
    }

    /// Every statement executed so far, oldest first.
    pub fn executed(&self) -> Vec<String> {
        match self.executed.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of statements executed so far.
    pub fn execution_count(&self) -> usize {
        self.executed().len()
    }

    /// Forget the execution log.
    pub fn clear_log(&self) {
        if let Ok(mut log) = self.executed.lock() {
            log.clear();
        }
    }
}

impl SqlBackend for ScriptedBackend {
    fn select_all(&self, sql: &str) -> BackendResult<Vec<Row>> {
        self.executed
            .lock()
            .map_err(|_| BackendError::Unavailable("execution log poisoned".into()))?
            .push(sql.to_string());

        match self.rules.iter().find(|r| r.matches(sql)) {
            Some(ScriptRule {
                answer: Answer::Rows(rows),
                ..
            }) => Ok(rows.clone()),
            Some(ScriptRule {
                answer: Answer::Fail(message),
                ..
            }) => Err(BackendError::Statement {
                sql: sql.to_string(),
                message: message.clone(),
            }),
            None => Ok(Vec::new()),
        }
    }
}
