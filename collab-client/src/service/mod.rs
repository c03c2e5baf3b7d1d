//! Pairing service abstraction.
//!
//! The pairing server answers three JSON/text requests:
//! - `GET /hello/{version}` with the user id and an optional update marker
//! - `GET /await-collaboration/{userid}`, a long poll that resolves once a
//!   partner joins
//! - `GET {script_path}` with the sync engine script
//!
//! The HTTP implementation lives in [`HttpPairingService`]; tests use
//! [`MockPairingService`].

mod http;
mod mock;

pub use http::HttpPairingService;
pub use mock::MockPairingService;

use async_trait::async_trait;
use collab_types::{HelloResponse, RawPairing, UserId, WireError};
use thiserror::Error;

/// Pairing service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request could not be completed.
    #[error("request to {path} failed: {reason}")]
    Request {
        /// Route that was requested.
        path: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("{path} returned status {status}")]
    Status {
        /// Route that was requested.
        path: String,
        /// HTTP status code.
        status: u16,
    },

    /// The body did not decode.
    #[error("malformed reply: {0}")]
    Malformed(#[from] WireError),

    /// The request was abandoned without an answer.
    #[error("request aborted: {0}")]
    Aborted(String),
}

/// Requests a Duet client makes to the pairing server.
///
/// Replies are returned undecided: validation belongs to the handshake.
#[async_trait]
pub trait PairingService: Send + Sync {
    /// Capability and version check.
    async fn hello(&self, version: &str) -> Result<HelloResponse, ServiceError>;

    /// Wait until a partner joins. No client-side timeout.
    async fn await_collaboration(&self, user: &UserId) -> Result<RawPairing, ServiceError>;

    /// Fetch the sync engine script.
    async fn fetch_script(&self, path: &str) -> Result<String, ServiceError>;
}
