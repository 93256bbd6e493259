//! Error types for the CrowdFlower client.
//!
//! # Design
//! HTTP failures are split by status class because callers react to them
//! differently: re-authenticate on `Authentication`, back off on
//! `RateLimited`, fix the payload on `Validation`. Statuses outside those
//! classes land in `HttpError` with the raw status and body. Local failures
//! (read-only attribute writes, operations on unsaved jobs, bad config) never
//! reach the network.

use thiserror::Error;

/// Errors returned by the client, transport and job proxy.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure: timeout, DNS, refused connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server returned 401 or 403: bad or missing API key.
    #[error("authentication failed (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },

    /// The server returned 404: the requested job does not exist.
    #[error("resource not found")]
    NotFound,

    /// The server returned 429. `retry_after_secs` comes from `Retry-After`.
    #[error("rate limited (retry after {retry_after_secs:?}s): {body}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        body: String,
    },

    /// The server returned 5xx.
    #[error("server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// The server rejected the payload (400 or 422).
    #[error("validation failed (HTTP {status}): {body}")]
    Validation { status: u16, body: String },

    /// Any other non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// Attempted to set a server-managed attribute.
    #[error("cannot change read only attribute '{0}'")]
    ReadOnlyAttribute(String),

    /// The operation needs a job id but the job was never saved.
    #[error("job has no id; save it first")]
    MissingId,

    /// No content type was given for an upload and none could be guessed
    /// from the file name.
    #[error("type not set and could not be guessed for '{0}'")]
    UnknownContentType(String),

    /// Reading a local file for upload failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or incomplete client configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound => Some(404),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Authentication { status, .. }
            | ApiError::Server { status, .. }
            | ApiError::Validation { status, .. }
            | ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
