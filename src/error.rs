//! Error kinds exposed by the gamification engine
//!
//! Callers only ever see these structured kinds. Raw SQLite errors are mapped
//! at the storage boundary: lock contention becomes [`EngineError::Conflict`]
//! (retryable), everything else becomes [`EngineError::Storage`].

use rusqlite::ErrorCode;

/// Result alias used throughout the engine
pub type EngineResult<T> = Result<T, EngineError>;

/// Structured error kinds returned by engine operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Reward {reward_id} was already consumed")]
    AlreadyConsumed { reward_id: String },

    #[error("Reward {reward_id} has expired")]
    Expired { reward_id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the operation may succeed if simply retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Stable machine-readable kind, used by the CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::AlreadyConsumed { .. } => "ALREADY_CONSUMED",
            Self::Expired { .. } => "EXPIRED",
            Self::Validation(_) => "VALIDATION",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE",
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Conflict(err.to_string())
            }
            _ => Self::Storage(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("Corrupt stored payload: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_maps_to_conflict() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let mapped = EngineError::from(err);
        assert!(mapped.is_retryable());
        assert_eq!(mapped.kind(), "CONFLICT");
    }

    #[test]
    fn test_other_sqlite_errors_map_to_storage() {
        let mapped = EngineError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(mapped.kind(), "STORAGE");
        assert!(!mapped.is_retryable());
    }
}
