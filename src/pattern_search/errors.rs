//! # Pattern Search Errors
//!
//! Every value error names the term it came from, so a caller can point the
//! user at the offending part of the search string.

use thiserror::Error;

use crate::query::QueryError;

pub type PatternSearchResult<T> = Result<T, PatternSearchError>;

#[derive(Debug, Error)]
pub enum PatternSearchError {
    #[error("Unable to parse search term: {term:?}")]
    BadTerm { term: String },

    #[error("Missing value for {var:?}")]
    Missing { var: String },

    #[error("Too many values for {var:?}")]
    TooMany { var: String },

    #[error("Value for {var:?} should be boolean, got: {val:?}")]
    BadBoolean { var: String, val: String },

    #[error("Value for {var:?} should be \"yes\", got: {val:?}")]
    BadYes { var: String, val: String },

    #[error("Value for {var:?} should be \"no\", \"include\" or \"only\", got: {val:?}")]
    BadYesNoBoth { var: String, val: String },

    #[error("Value for {var:?} should be a number between {min} and {max}, got: {val:?}")]
    BadFloat { var: String, val: String, min: f64, max: f64 },

    #[error("Value for {var:?} should be a confidence between -100 and 100, or a range of them, got: {val:?}")]
    BadConfidence { var: String, val: String },

    #[error("Value for {var:?} should be a date or date range, got: {val:?}")]
    BadDateRange { var: String, val: String },

    #[error("Unknown name for {var:?}: {val:?}")]
    BadName { var: String, val: String },

    #[error("Unknown location for {var:?}: {val:?}")]
    BadLocation { var: String, val: String },

    #[error("Unknown project for {var:?}: {val:?}")]
    BadProject { var: String, val: String },

    #[error("Unknown species list for {var:?}: {val:?}")]
    BadSpeciesList { var: String, val: String },

    #[error("Unknown user for {var:?}: {val:?}")]
    BadUser { var: String, val: String },

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl PatternSearchError {
    /// The term the error is about, if it is about one.
    pub fn var(&self) -> Option<&str> {
        match self {
            PatternSearchError::BadTerm { .. } | PatternSearchError::Query(_) => None,
            PatternSearchError::Missing { var }
            | PatternSearchError::TooMany { var }
            | PatternSearchError::BadBoolean { var, .. }
            | PatternSearchError::BadYes { var, .. }
            | PatternSearchError::BadYesNoBoth { var, .. }
            | PatternSearchError::BadFloat { var, .. }
            | PatternSearchError::BadConfidence { var, .. }
            | PatternSearchError::BadDateRange { var, .. }
            | PatternSearchError::BadName { var, .. }
            | PatternSearchError::BadLocation { var, .. }
            | PatternSearchError::BadProject { var, .. }
            | PatternSearchError::BadSpeciesList { var, .. }
            | PatternSearchError::BadUser { var, .. } => Some(var),
        }
    }

    /// Stable code for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            PatternSearchError::BadTerm { .. } => "MQ_PATTERN_BAD_TERM",
            PatternSearchError::Missing { .. } => "MQ_PATTERN_MISSING_VALUE",
            PatternSearchError::TooMany { .. } => "MQ_PATTERN_TOO_MANY_VALUES",
            PatternSearchError::BadBoolean { .. } => "MQ_PATTERN_BAD_BOOLEAN",
            PatternSearchError::BadYes { .. } => "MQ_PATTERN_BAD_YES",
            PatternSearchError::BadYesNoBoth { .. } => "MQ_PATTERN_BAD_YES_NO_BOTH",
            PatternSearchError::BadFloat { .. } => "MQ_PATTERN_BAD_FLOAT",
            PatternSearchError::BadConfidence { .. } => "MQ_PATTERN_BAD_CONFIDENCE",
            PatternSearchError::BadDateRange { .. } => "MQ_PATTERN_BAD_DATE_RANGE",
            PatternSearchError::BadName { .. } => "MQ_PATTERN_BAD_NAME",
            PatternSearchError::BadLocation { .. } => "MQ_PATTERN_BAD_LOCATION",
            PatternSearchError::BadProject { .. } => "MQ_PATTERN_BAD_PROJECT",
            PatternSearchError::BadSpeciesList { .. } => "MQ_PATTERN_BAD_SPECIES_LIST",
            PatternSearchError::BadUser { .. } => "MQ_PATTERN_BAD_USER",
            PatternSearchError::Query(e) => e.code().code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_and_code() {
        let err = PatternSearchError::BadUser {
            var: "user".into(),
            val: "nobody".into(),
        };
        assert_eq!(err.var(), Some("user"));
        assert_eq!(err.code(), "MQ_PATTERN_BAD_USER");
        assert_eq!(err.to_string(), r#"Unknown user for "user": "nobody""#);

        let err = PatternSearchError::BadTerm { term: "\"open".into() };
        assert_eq!(err.var(), None);
    }
}
