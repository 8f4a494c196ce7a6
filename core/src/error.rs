//! Error types for the Groove API client.
//!
//! # Design
//! Each variant maps to one failure class of a single request/response
//! round-trip. Nothing is retried; the variant tells the caller which side
//! of the exchange went wrong. `Http` keeps the raw status and body for
//! debugging, since the remote API's error payloads are not modeled.

use thiserror::Error;

/// Errors returned by `GrooveApi` parse methods and `GrooveClient` calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP layer failed before a response was received (network, TLS,
    /// timeout, malformed header value).
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body is not valid JSON.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The response parsed but the expected top-level field is absent or
    /// has the wrong shape.
    #[error("response has no `{0}` array")]
    MissingField(&'static str),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<ureq::Error> for ApiError {
    fn from(err: ureq::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;
