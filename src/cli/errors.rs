//! CLI-specific error types
//!
//! Every CLI error is fatal: it is printed once and the process exits 1.

use std::fmt;
use std::io;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::pattern_search::PatternSearchError;
use crate::query::QueryError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, fixture files)
    IoError,
    /// Malformed command-line argument
    InvalidArgument,
    /// The query engine rejected or failed the query
    QueryFailed,
    /// The search string could not be parsed
    PatternRejected,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "MQ_CLI_CONFIG_ERROR",
            Self::IoError => "MQ_CLI_IO_ERROR",
            Self::InvalidArgument => "MQ_CLI_INVALID_ARGUMENT",
            Self::QueryFailed => "MQ_CLI_QUERY_FAILED",
            Self::PatternRejected => "MQ_CLI_PATTERN_REJECTED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidArgument, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<BackendError> for CliError {
    fn from(e: BackendError) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<QueryError> for CliError {
    fn from(e: QueryError) -> Self {
        Self::new(CliErrorCode::QueryFailed, e.to_string())
    }
}

impl From<PatternSearchError> for CliError {
    fn from(e: PatternSearchError) -> Self {
        match e {
            PatternSearchError::Query(e) => e.into(),
            other => Self::new(
                CliErrorCode::PatternRejected,
                format!("{}: {}", other.code(), other),
            ),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes_code() {
        let err = CliError::invalid_argument("--params must be a JSON object");
        assert_eq!(
            err.to_string(),
            "MQ_CLI_INVALID_ARGUMENT: --params must be a JSON object"
        );
    }

    #[test]
    fn test_query_errors_keep_their_code_in_the_message() {
        let err: CliError = QueryError::unknown_model("Mushroom").into();
        assert_eq!(err.code(), &CliErrorCode::QueryFailed);
        assert!(err.message().contains("MQ_QUERY_UNKNOWN_MODEL"));
    }

    #[test]
    fn test_pattern_errors() {
        let err: CliError = PatternSearchError::Missing { var: "user".into() }.into();
        assert_eq!(err.code_str(), "MQ_CLI_PATTERN_REJECTED");
        assert!(err.message().starts_with("MQ_PATTERN_MISSING_VALUE"));
    }
}
