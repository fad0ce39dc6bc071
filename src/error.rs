//! Error handling for the Ropify client

use std::fmt;
use thiserror::Error;

/// Unified error type for the remote gateway
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The server answered with a non-2xx status
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The credential store could not be read while stamping a request
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Local file errors (reading an image handle)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// Whether the request never produced a usable HTTP exchange
    /// (connection refused, timeout, local I/O).
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            Error::Io(_) | Error::Storage(_) | Error::Url(_) => true,
            Error::Json(_) | Error::Status { .. } | Error::General(_) => false,
        }
    }
}

/// Failures of the persisted credential store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("failed to read credential store: {0}")]
    ReadFailure(String),

    #[error("failed to write credential store: {0}")]
    WriteFailure(String),
}

/// Failures of an authentication attempt
#[derive(Error, Debug)]
pub enum AuthError {
    /// The identity endpoint rejected the credential or answered with an
    /// unusable payload.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The deep-link callback payload could not be decoded.
    #[error("malformed OAuth callback: {0}")]
    MalformedCallback(String),

    /// The identity endpoint could not be reached.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Local validation failed; nothing was sent.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Another authentication attempt is already in flight.
    #[error("an authentication attempt is already in progress")]
    InFlight,

    /// The operation needs an authenticated session.
    #[error("not signed in")]
    NotAuthenticated,

    /// The session was logged out or replaced while the request was running;
    /// its result was dropped.
    #[error("the session changed while the request was in flight")]
    Superseded,

    /// The resolved session could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuthError {
    /// Classify a gateway error for an identity endpoint. The endpoint is the
    /// sole arbiter of validity, so anything that reached it and failed is
    /// treated as a rejected credential.
    pub fn from_gateway(err: Error) -> Self {
        if err.is_transport() {
            AuthError::TransportFailure(err.to_string())
        } else {
            AuthError::InvalidCredentials(err.to_string())
        }
    }
}

/// Failures of the garment capture pipeline
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("a capture is already being analyzed")]
    Busy,

    #[error("garment analysis failed: {0}")]
    AnalysisFailed(String),
}

impl From<Error> for CaptureError {
    fn from(err: Error) -> Self {
        CaptureError::AnalysisFailed(err.to_string())
    }
}
