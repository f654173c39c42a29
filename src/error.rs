use thiserror::Error;

use crate::services::store::StoreError;

/// Errors surfaced by the discovery, quota and matching operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// User-correctable: the caller should offer an upgrade or package purchase
    #[error("Request quota exceeded ({used}/{limit})")]
    QuotaExceeded { used: u32, limit: u32 },

    /// Wrong caller or wrong state; permanent, never retried
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Referenced entity is gone; callers treat it as stale and refresh
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transient collaborator failure; no local state was mutated
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => CoreError::NotFound(what),
            StoreError::Conflict(what) => CoreError::InvalidTransition(what),
            other => {
                tracing::error!("Store failure: {}", other);
                CoreError::StoreUnavailable(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: CoreError = StoreError::NotFound("offer 1".into()).into();
        assert!(matches!(err, CoreError::NotFound(_)));

        let err: CoreError = StoreError::Conflict("duplicate request".into()).into();
        assert!(matches!(err, CoreError::InvalidTransition(_)));

        let err: CoreError = StoreError::Unavailable("connection reset".into()).into();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
    }
}
