use thiserror::Error;

/// Shared error type for identity services.
///
/// `NotFound`, `Conflict`, `Forbidden` and `Validation` are recoverable and
/// may be surfaced to callers; `Invariant` signals storage corruption or a
/// concurrency bug and must abort the enclosing transaction.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::Database(anyhow::Error::new(other)),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(anyhow::Error::new(err))
    }
}

impl AppError {
    /// Whether the error is a Postgres serialization/deadlock failure and the
    /// enclosing transaction may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        let db_err = match self {
            AppError::Database(e) => e.downcast_ref::<sqlx::Error>(),
            _ => None,
        };
        match db_err {
            Some(sqlx::Error::Database(e)) => {
                matches!(e.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }

    /// Whether the error may be shown to the caller as-is.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_)
                | AppError::Conflict(_)
                | AppError::Forbidden(_)
                | AppError::Validation(_)
        )
    }
}
