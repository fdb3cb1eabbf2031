//! Driver error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors returned by the session lifecycle and send path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not connected")]
    NotConnected,

    #[error("session already started")]
    AlreadyStarted,

    #[error("session stopped")]
    Stopped,
}

/// Errors returned to callers of the driver.
///
/// Transport failures never show up here; the session absorbs them and
/// reports them through the status sink instead.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("encoding error: {0}")]
    Codec(#[from] tbus_core::Error),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
