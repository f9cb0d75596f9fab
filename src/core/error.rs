//! Application-wide error types.

use thiserror::Error;

use crate::router::error::RefreshError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
