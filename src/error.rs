//! Application-wide error types.
//!
//! The remote client has its own taxonomy in [`crate::client::ClientError`];
//! it converts into [`AppError::Client`] at the binary boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error(transparent)]
    Client(#[from] crate::client::ClientError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
