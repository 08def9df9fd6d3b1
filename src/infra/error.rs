//! Error types for the promo engine infrastructure

use thiserror::Error;

use crate::domain::{InvalidValue, Rejection};

/// Constraint guarding `(promo_code_id, spot_number)` uniqueness.
pub const SPOT_UNIQUE_CONSTRAINT: &str = "promo_redemptions_code_spot_key";

/// Errors that can occur while validating or redeeming a code
#[derive(Error, Debug)]
pub enum PromoError {
    /// Malformed request input
    #[error("validation error: {0}")]
    Validation(String),

    /// Expected business-rule outcome
    #[error("{0}")]
    Rejected(Rejection),

    /// Transient contention during spot assignment
    #[error("allocation conflict: {0}")]
    AllocationConflict(String),

    /// Profile write failed after the redemption committed
    #[error("profile projection failed: {0}")]
    ProfileProjection(String),

    /// Datastore unreachable or timed out
    #[error("datastore unavailable: {0}")]
    DatastoreUnavailable(String),

    /// Unclassified database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl PromoError {
    /// Classify a database error into contention, outage or plain failure.
    pub fn from_db(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                PromoError::DatastoreUnavailable(err.to_string())
            }
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                let spot_collision =
                    code == "23505" && db_err.constraint() == Some(SPOT_UNIQUE_CONSTRAINT);

                if spot_collision
                    // serialization failure
                    || code == "40001"
                    // deadlock detected
                    || code == "40P01"
                    // lock_not_available (lock_timeout)
                    || code == "55P03"
                {
                    PromoError::AllocationConflict(db_err.message().to_string())
                } else if code.starts_with("08") || code.starts_with("57") {
                    PromoError::DatastoreUnavailable(db_err.message().to_string())
                } else {
                    PromoError::Database(err)
                }
            }
            _ => PromoError::Database(err),
        }
    }

    /// Only allocation contention is retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PromoError::AllocationConflict(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            PromoError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

impl From<Rejection> for PromoError {
    fn from(rejection: Rejection) -> Self {
        PromoError::Rejected(rejection)
    }
}

impl From<InvalidValue> for PromoError {
    fn from(err: InvalidValue) -> Self {
        PromoError::Validation(err.message)
    }
}

/// Result type for promo operations
pub type Result<T> = std::result::Result<T, PromoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_outages() {
        assert!(matches!(
            PromoError::from_db(sqlx::Error::PoolTimedOut),
            PromoError::DatastoreUnavailable(_)
        ));
        assert!(matches!(
            PromoError::from_db(sqlx::Error::RowNotFound),
            PromoError::Database(_)
        ));
    }

    #[test]
    fn test_only_conflicts_retry() {
        assert!(PromoError::AllocationConflict("busy".into()).is_retryable());
        assert!(!PromoError::Rejected(Rejection::Exhausted).is_retryable());
        assert!(!PromoError::DatastoreUnavailable("down".into()).is_retryable());
    }

    #[test]
    fn test_rejection_display_is_message() {
        let err = PromoError::from(Rejection::Expired);
        assert_eq!(err.to_string(), "This promo code has expired");
        assert_eq!(err.rejection(), Some(&Rejection::Expired));
    }
}
