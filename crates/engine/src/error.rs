//! Engine error types.
//!
//! Store failures are classified once, at the boundary where a `sqlx::Error`
//! is observed. The full error is logged together with the resource and
//! operation it belongs to; `Display` stays generic so that query text and
//! driver messages never reach a caller.

use thiserror::Error;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE for `query_canceled`, raised when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not acquire a database connection")]
    ConnectionAcquisitionFailed,

    #[error("{resource} {operation} failed")]
    QueryExecutionFailed {
        resource: &'static str,
        operation: &'static str,
    },

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("{resource} already exists")]
    UniqueConstraintViolation { resource: &'static str },

    #[error("{resource} {operation} timed out")]
    Timeout {
        resource: &'static str,
        operation: &'static str,
    },

    #[error("{resource} was modified concurrently")]
    Conflict { resource: &'static str },

    #[error("invalid value for filter '{key}': {reason}")]
    InvalidFilter { key: String, reason: String },
}

impl EngineError {
    /// Classify a store error for `resource`/`operation`, logging the details.
    pub fn from_sqlx(resource: &'static str, operation: &'static str, err: sqlx::Error) -> Self {
        let classified = match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::ConnectionAcquisitionFailed
            }
            sqlx::Error::RowNotFound => Self::NotFound { resource },
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => Self::UniqueConstraintViolation { resource },
                Some(QUERY_CANCELED) => Self::Timeout {
                    resource,
                    operation,
                },
                _ => Self::QueryExecutionFailed {
                    resource,
                    operation,
                },
            },
            _ => Self::QueryExecutionFailed {
                resource,
                operation,
            },
        };

        match classified {
            Self::NotFound { .. } => {
                tracing::debug!(resource, operation, "row not found");
            }
            _ => {
                tracing::error!(resource, operation, error = %err, "database error");
            }
        }

        classified
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn invalid_filter(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

/// Attach resource/operation context to a `sqlx` result.
pub(crate) trait StoreContext<T> {
    fn store_context(self, resource: &'static str, operation: &'static str) -> EngineResult<T>;
}

impl<T> StoreContext<T> for Result<T, sqlx::Error> {
    fn store_context(self, resource: &'static str, operation: &'static str) -> EngineResult<T> {
        self.map_err(|e| EngineError::from_sqlx(resource, operation, e))
    }
}
