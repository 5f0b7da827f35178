use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    #[error("Invalid alert transition: {0}")]
    InvalidTransition(String),
    #[error("Publish error: {0}")]
    Publish(String),
    #[error("External error: {0}")]
    External(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Cancelled")]
    Cancelled,
}

impl AppError {
    /// Errors that are worth a retry on the next scheduled pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Db(_) | AppError::Publish(_) | AppError::External(_) | AppError::Timeout(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::Db(other),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Publish(value.to_string())
    }
}
