//! Error types for the MIDI session
//!
//! Only `InvalidArgument` (and the initialization failures) reach callers as
//! hard errors. Everything raised at the device boundary is caught by the
//! session and downgraded to a boolean or a [`SendOutcome`](crate::send::SendOutcome).

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("MIDI is not supported on this platform: {0}")]
    UnsupportedPlatform(String),

    #[error("MIDI access denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("send failed: {0}")]
    SendFailure(String),

    #[error("invalid config: {0}")]
    Config(String),
}

/// Fieldless discriminant of [`Error`], used in structured outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    UnsupportedPlatform,
    PermissionDenied,
    InvalidArgument,
    DeviceUnavailable,
    SendFailure,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Error::SendFailure(_) => ErrorKind::SendFailure,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Message without the kind prefix added by `Display`
    pub fn message(&self) -> &str {
        match self {
            Error::UnsupportedPlatform(m)
            | Error::PermissionDenied(m)
            | Error::InvalidArgument(m)
            | Error::DeviceUnavailable(m)
            | Error::SendFailure(m)
            | Error::Config(m) => m,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
