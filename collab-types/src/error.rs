//! Error types for Duet wire payloads.

use thiserror::Error;

/// Errors raised while decoding pairing-service payloads.
#[derive(Debug, Error)]
pub enum WireError {
    /// The body was not valid JSON for the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    /// A mandatory field was absent or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
