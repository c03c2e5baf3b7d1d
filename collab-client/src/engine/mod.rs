//! Facade over the embedded sync engine.
//!
//! The engine runs the operational-transform algorithm and owns the
//! transport to the collaboration server. Duet only drives it through the
//! calls of [`SyncEngine`] and receives callbacks through [`EngineHost`]
//! and the per-document [`DocCallback`].
//!
//! Engines are single-threaded. [`EngineActor`] creates the engine on a
//! dedicated thread and every call is sent there as a message.

mod actor;
mod mock;

pub use actor::{EngineActor, EngineFactory, EngineHandle, ENGINE_THREAD_NAME};
pub use mock::MockEngine;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use collab_core::SessionState;
use collab_types::SessionId;
use serde_json::Value;
use thiserror::Error;

use crate::session::SessionListener;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be created.
    #[error("engine could not be created: {0}")]
    Create(String),

    /// A script failed to load or evaluate.
    #[error("script {name} failed: {reason}")]
    Script {
        /// Script name.
        name: String,
        /// Why it failed.
        reason: String,
    },

    /// The host object could not be exposed to the engine.
    #[error("binding {name} rejected: {reason}")]
    Host {
        /// Binding name.
        name: String,
        /// Why it failed.
        reason: String,
    },

    /// A named engine function failed.
    #[error("call to {function} failed: {reason}")]
    Invoke {
        /// Function name.
        function: String,
        /// Why it failed.
        reason: String,
    },

    /// The transport could not be started.
    #[error("transport connect failed: {0}")]
    Connect(String),

    /// Any other engine call failed.
    #[error("{operation} failed: {reason}")]
    Call {
        /// Facade operation.
        operation: &'static str,
        /// Why it failed.
        reason: String,
    },

    /// The engine thread has exited.
    #[error("engine thread has stopped")]
    Stopped,
}

/// Engine-side handle of a shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocHandle(u64);

impl DocHandle {
    /// Wrap an engine document id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The engine document id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Called once the engine knows the shared content of an opened document.
pub type DocCallback = Box<dyn FnOnce(DocHandle, String) + Send>;

/// Called once the engine has finished disconnecting.
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Calls Duet makes into the embedded engine.
///
/// All methods run on the engine thread. Callbacks may be invoked from
/// inside the call or later, but always on the engine thread.
pub trait SyncEngine {
    /// Load and evaluate a script.
    fn load_script(&mut self, name: &str, source: &str) -> Result<(), EngineError>;

    /// Expose the session host under `name`.
    fn bind_host(&mut self, name: &str, host: EngineHost) -> Result<(), EngineError>;

    /// Call a named engine function.
    fn invoke(&mut self, function: &str, args: &[Value]) -> Result<Value, EngineError>;

    /// Start the transport at `url`. Lifecycle events are reported to the
    /// bound host.
    fn connect(&mut self, url: &str) -> Result<(), EngineError>;

    /// Send a keepalive for `session`.
    fn ping(&mut self, session: &SessionId) -> Result<(), EngineError>;

    /// Open `path` as a shared document seeded with `local`.
    fn open(&mut self, path: &str, local: &str, on_resolved: DocCallback)
        -> Result<(), EngineError>;

    /// Start synchronizing a reconciled document from `content`.
    fn attach(&mut self, doc: DocHandle, content: &str) -> Result<(), EngineError>;

    /// Forget a document.
    fn release(&mut self, doc: DocHandle);

    /// Close the transport, then call `on_complete`.
    fn disconnect(&mut self, on_complete: CompletionCallback);

    /// Last call before the engine thread exits.
    fn shutdown(&mut self) {}
}

/// The session as seen from inside the engine.
///
/// Receives transport lifecycle events, applies them to the session state
/// machine and notifies the session listener.
#[derive(Clone)]
pub struct EngineHost {
    shared: Arc<HostShared>,
}

struct HostShared {
    session_id: SessionId,
    state: Mutex<SessionState>,
    listener: Arc<dyn SessionListener>,
}

impl EngineHost {
    pub(crate) fn new(session_id: SessionId, listener: Arc<dyn SessionListener>) -> Self {
        Self {
            shared: Arc::new(HostShared {
                session_id,
                state: Mutex::new(SessionState::new()),
                listener,
            }),
        }
    }

    /// Session this host belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.shared.session_id
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Report a transport lifecycle event (`"connected"`, `"disconnected"`,
    /// `"closed"`, `"stopped"`). Other events are ignored.
    ///
    /// The listener runs after the state is updated and outside the lock,
    /// once per actual change.
    pub fn connection_state(&self, event: &str, reason: Option<&str>) {
        let transition = {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let (next, transition) = state.on_raw_event(event);
            *state = next;
            transition
        };

        match transition {
            Some(t) => {
                tracing::info!(
                    session = %self.shared.session_id,
                    from = %t.from,
                    to = %t.to,
                    reason = reason.unwrap_or(""),
                    "session state changed"
                );
                self.shared.listener.on_state_change(t.to);
            }
            None => tracing::debug!(event, "connection event left state unchanged"),
        }
    }
}

impl fmt::Debug for EngineHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHost")
            .field("session_id", &self.shared.session_id)
            .field("state", &self.state())
            .finish()
    }
}
