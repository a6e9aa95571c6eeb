//! Error types for the synchronizer

use thiserror::Error;

use crate::status::StatusError;

/// Errors surfaced by a synchronization step
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("status source unavailable: {0}")]
    Status(#[from] StatusError),

    #[error("browser host call failed: {0}")]
    Host(String),

    #[error("native messaging protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
