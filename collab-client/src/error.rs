//! Top-level client error.

use collab_types::WireError;
use thiserror::Error;

use crate::cancel::OperationError;
use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::service::ServiceError;

/// Errors surfaced to the host editor.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Pairing service unreachable, refused the request or replied with
    /// something unreadable.
    #[error("network failure: {0}")]
    Network(#[from] ServiceError),

    /// The server requires a newer client.
    #[error("client version {version} is out of date, update at {update_url}")]
    VersionMismatch {
        /// Version this client reported.
        version: String,
        /// Newest version, when the server named one.
        latest: Option<String>,
        /// Page offering the update.
        update_url: String,
    },

    /// The user cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The pairing reply lacked a mandatory credential.
    #[error("incomplete pairing credentials: {0}")]
    IncompleteCredentials(#[source] WireError),

    /// The sync engine could not be set up or connected.
    #[error("sync engine bootstrap failed: {0}")]
    EngineBootstrap(#[source] EngineError),

    /// An engine call failed after bootstrap.
    #[error("sync engine error: {0}")]
    Engine(#[source] EngineError),

    /// The engine thread is gone.
    #[error("sync engine has stopped")]
    EngineStopped,

    /// `open` was called before `start`.
    #[error("session not started")]
    NotStarted,

    /// The session was stopped.
    #[error("session stopped")]
    Stopped,

    /// Another open of the same path has not finished.
    #[error("open already in progress for {0}")]
    OpenInProgress(String),

    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Check if the user cancelled, as opposed to a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Map an engine error raised after bootstrap.
    pub(crate) fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::Stopped => Self::EngineStopped,
            other => Self::Engine(other),
        }
    }
}

impl From<OperationError<ServiceError>> for ClientError {
    fn from(err: OperationError<ServiceError>) -> Self {
        match err {
            OperationError::Cancelled => Self::Cancelled,
            OperationError::Failed(e) => Self::Network(e),
            OperationError::Aborted(reason) => Self::Network(ServiceError::Aborted(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_first_class() {
        let err: ClientError = OperationError::<ServiceError>::Cancelled.into();
        assert!(err.is_cancelled());
        assert!(matches!(err, ClientError::Cancelled));
    }

    #[test]
    fn service_failure_is_network() {
        let err: ClientError = OperationError::Failed(ServiceError::Status {
            path: "/hello/2.0".into(),
            status: 500,
        })
        .into();
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn aborted_worker_is_network() {
        let err: ClientError = OperationError::<ServiceError>::Aborted("panic".into()).into();
        assert!(matches!(err, ClientError::Network(ServiceError::Aborted(_))));
    }

    #[test]
    fn stopped_engine_maps_to_engine_stopped() {
        assert!(matches!(
            ClientError::from_engine(EngineError::Stopped),
            ClientError::EngineStopped
        ));
        assert!(matches!(
            ClientError::from_engine(EngineError::Call {
                operation: "open",
                reason: "x".into()
            }),
            ClientError::Engine(_)
        ));
    }
}
