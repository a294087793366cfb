use thiserror::Error;

use super::failure::FailureClassification;
use super::retry::RetryFailure;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Counter data access failed in {operation} after {attempts} attempt(s): {classification}")]
    DataAccess {
        operation: &'static str,
        attempts: u32,
        classification: FailureClassification,
    },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            field,
            value: value.into(),
        }
    }

    /// Whether this error came from a transient infrastructure failure
    /// and the surrounding tick may succeed next time.
    pub fn is_transient(&self) -> bool {
        match self {
            DomainError::DataAccess { classification, .. } => {
                classification.category.is_transient()
            }
            _ => false,
        }
    }

    /// Convert a retry failure from a named read into a domain error.
    pub fn from_retry(
        operation: &'static str,
        failure: RetryFailure<FailureClassification>,
    ) -> Self {
        match failure {
            RetryFailure::Exhausted { attempts, last_error }
            | RetryFailure::NotRetryable {
                attempts,
                error: last_error,
            } => DomainError::DataAccess {
                operation,
                attempts,
                classification: last_error,
            },
            RetryFailure::Cancelled {
                attempts,
                cancelled_during_delay,
                ..
            } => DomainError::Cancelled(format!(
                "{} cancelled after {} attempt(s){}",
                operation,
                attempts,
                if cancelled_during_delay {
                    " while waiting to retry"
                } else {
                    ""
                }
            )),
        }
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DomainError::Validation(errors.to_string())
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
