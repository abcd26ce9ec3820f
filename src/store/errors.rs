//! # Store Errors

use thiserror::Error;

/// Result type for persisted-query store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted-query store errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Persisted query not found: {0}")]
    NotFound(u64),

    #[error("Persisted query already exists: {0}")]
    AlreadyExists(u64),

    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Store file is corrupt: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(StoreError::NotFound(7).to_string(), "Persisted query not found: 7");
        assert_eq!(StoreError::LockPoisoned.to_string(), "Store lock poisoned");
    }

    #[test]
    fn test_transient() {
        assert!(StoreError::Io("disk full".into()).is_transient());
        assert!(!StoreError::Corrupt("bad json".into()).is_transient());
    }
}
