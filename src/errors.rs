use std::io;
use std::time::Duration;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
    #[error("places provider error: {0}")]
    Provider(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("location source error: {0}")]
    Location(String),
    #[error("invalid value: {0}")]
    Validation(String),
}

impl AppError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Http(_) | AppError::Provider(_) | AppError::Timeout(_) | AppError::Location(_)
        )
    }
}
