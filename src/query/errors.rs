//! Query error types
//!
//! Error codes:
//! - MQ_QUERY_UNKNOWN_MODEL (CONFIG)
//! - MQ_QUERY_UNKNOWN_FLAVOR (CONFIG)
//! - MQ_QUERY_UNKNOWN_PARAM (CONFIG)
//! - MQ_QUERY_MISSING_PARAM (CONFIG)
//! - MQ_QUERY_UNKNOWN_JOIN (CONFIG)
//! - MQ_QUERY_UNKNOWN_TABLE (CONFIG)
//! - MQ_QUERY_BAD_DECLARATION (CONFIG)
//! - MQ_QUERY_BAD_SORT_ORDER (CONFIG)
//! - MQ_QUERY_BAD_VALUE (REJECT)
//! - MQ_QUERY_NOT_IN_ALLOWED_SET (REJECT)
//! - MQ_QUERY_NOT_FOUND (REJECT)
//! - MQ_QUERY_BACKEND (PROPAGATED)
//! - MQ_QUERY_STORE (PROPAGATED)

use std::fmt;

use crate::backend::BackendError;
use crate::schema::JoinError;
use crate::store::StoreError;

/// Severity levels for query errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Programming or configuration bug; never recovered
    Config,
    /// Caller supplied a bad value; surfaced to the user
    Reject,
    /// Collaborator failure passed through unchanged
    Propagated,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Config => write!(f, "CONFIG"),
            Severity::Reject => write!(f, "REJECT"),
            Severity::Propagated => write!(f, "PROPAGATED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    UnknownModel,
    UnknownFlavor,
    UnknownParam,
    MissingParam,
    UnknownJoin,
    UnknownTable,
    BadDeclaration,
    BadSortOrder,
    BadValue,
    NotInAllowedSet,
    NotFound,
    Backend,
    Store,
}

impl QueryErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::UnknownModel => "MQ_QUERY_UNKNOWN_MODEL",
            QueryErrorCode::UnknownFlavor => "MQ_QUERY_UNKNOWN_FLAVOR",
            QueryErrorCode::UnknownParam => "MQ_QUERY_UNKNOWN_PARAM",
            QueryErrorCode::MissingParam => "MQ_QUERY_MISSING_PARAM",
            QueryErrorCode::UnknownJoin => "MQ_QUERY_UNKNOWN_JOIN",
            QueryErrorCode::UnknownTable => "MQ_QUERY_UNKNOWN_TABLE",
            QueryErrorCode::BadDeclaration => "MQ_QUERY_BAD_DECLARATION",
            QueryErrorCode::BadSortOrder => "MQ_QUERY_BAD_SORT_ORDER",
            QueryErrorCode::BadValue => "MQ_QUERY_BAD_VALUE",
            QueryErrorCode::NotInAllowedSet => "MQ_QUERY_NOT_IN_ALLOWED_SET",
            QueryErrorCode::NotFound => "MQ_QUERY_NOT_FOUND",
            QueryErrorCode::Backend => "MQ_QUERY_BACKEND",
            QueryErrorCode::Store => "MQ_QUERY_STORE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            QueryErrorCode::UnknownModel
            | QueryErrorCode::UnknownFlavor
            | QueryErrorCode::UnknownParam
            | QueryErrorCode::MissingParam
            | QueryErrorCode::UnknownJoin
            | QueryErrorCode::UnknownTable
            | QueryErrorCode::BadDeclaration
            | QueryErrorCode::BadSortOrder => Severity::Config,
            QueryErrorCode::BadValue | QueryErrorCode::NotInAllowedSet | QueryErrorCode::NotFound => {
                Severity::Reject
            }
            QueryErrorCode::Backend | QueryErrorCode::Store => Severity::Propagated,
        }
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cause {
    Backend(BackendError),
    Store(StoreError),
}

/// Query error with full context
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    code: QueryErrorCode,
    message: String,
    /// Parameter that failed, for user-facing errors
    param: Option<String>,
    /// Permitted values, for NotInAllowedSet
    allowed: Vec<String>,
    cause: Option<Cause>,
}

impl QueryError {
    fn new(code: QueryErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            param: None,
            allowed: Vec::new(),
            cause: None,
        }
    }

    pub fn unknown_model(model: impl Into<String>) -> Self {
        Self::new(
            QueryErrorCode::UnknownModel,
            format!("Invalid model: '{}'", model.into()),
        )
    }

    pub fn unknown_flavor(model: impl fmt::Display, flavor: impl Into<String>) -> Self {
        Self::new(
            QueryErrorCode::UnknownFlavor,
            format!("Invalid flavor :{} for {} queries", flavor.into(), model),
        )
    }

    pub fn unknown_param(context: impl Into<String>, param: impl Into<String>) -> Self {
        let p = param.into();
        let mut err = Self::new(
            QueryErrorCode::UnknownParam,
            format!("Unexpected parameter :{} in {} query", p, context.into()),
        );
        err.param = Some(p);
        err
    }

    pub fn missing_param(context: impl Into<String>, param: impl Into<String>) -> Self {
        let p = param.into();
        let mut err = Self::new(
            QueryErrorCode::MissingParam,
            format!("Missing :{} parameter for {} query", p, context.into()),
        );
        err.param = Some(p);
        err
    }

    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::new(
            QueryErrorCode::UnknownTable,
            format!("Don't know the table '{}'", table.into()),
        )
    }

    pub fn bad_declaration(reason: impl Into<String>) -> Self {
        Self::new(QueryErrorCode::BadDeclaration, reason.into())
    }

    pub fn bad_sort_order(model: impl fmt::Display, by: impl Into<String>) -> Self {
        let by = by.into();
        let mut err = Self::new(
            QueryErrorCode::BadSortOrder,
            format!("Can't figure out how to sort {} by :{}", model, by),
        );
        err.param = Some("by".into());
        err
    }

    pub fn bad_value(param: impl Into<String>, reason: impl Into<String>) -> Self {
        let p = param.into();
        let mut err = Self::new(
            QueryErrorCode::BadValue,
            format!("Value for :{} {}", p, reason.into()),
        );
        err.param = Some(p);
        err
    }

    pub fn not_in_allowed_set(param: impl Into<String>, value: impl Into<String>, allowed: &[&str]) -> Self {
        let p = param.into();
        let mut err = Self::new(
            QueryErrorCode::NotInAllowedSet,
            format!(
                "Value for :{} should be one of {}, got: {:?}",
                p,
                allowed.join(", "),
                value.into()
            ),
        );
        err.param = Some(p);
        err.allowed = allowed.iter().map(|s| s.to_string()).collect();
        err
    }

    pub fn not_found(param: impl Into<String>, what: impl Into<String>) -> Self {
        let p = param.into();
        let mut err = Self::new(
            QueryErrorCode::NotFound,
            format!("Couldn't find {} for :{}", what.into(), p),
        );
        err.param = Some(p);
        err
    }

    pub fn code(&self) -> QueryErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The parameter that failed, if the error concerns one.
    pub fn param(&self) -> Option<&str> {
        self.param.as_deref()
    }

    /// Permitted values for a NotInAllowedSet error.
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// True for configuration errors, which are programming bugs.
    pub fn is_config_error(&self) -> bool {
        self.severity() == Severity::Config
    }

    pub fn backend_error(&self) -> Option<&BackendError> {
        match &self.cause {
            Some(Cause::Backend(e)) => Some(e),
            _ => None,
        }
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        match &self.cause {
            Some(Cause::Store(e)) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            Some(Cause::Backend(e)) => Some(e),
            Some(Cause::Store(e)) => Some(e),
            None => None,
        }
    }
}

impl From<BackendError> for QueryError {
    fn from(err: BackendError) -> Self {
        let mut q = Self::new(QueryErrorCode::Backend, err.to_string());
        q.cause = Some(Cause::Backend(err));
        q
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        let mut q = Self::new(QueryErrorCode::Store, err.to_string());
        q.cause = Some(Cause::Store(err));
        q
    }
}

impl From<JoinError> for QueryError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::UnknownTable(table) => QueryError::unknown_table(table),
            other => Self::new(QueryErrorCode::UnknownJoin, other.to_string()),
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
