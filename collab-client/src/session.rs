//! Paired editing sessions.
//!
//! [`SessionConnection::connect`] pairs with a partner, boots the sync
//! engine and starts the transport. From then on the engine reports
//! transport events through the session's [`EngineHost`] and every state
//! change reaches the [`SessionListener`] once.
//!
//! ```ignore
//! let env = SessionEnv::new(config, engine_factory, merge_prompt)?;
//! let session = SessionConnection::connect("demo", env, listener, &progress).await?;
//! session.start();
//! let binding = session.open("src/main.rs", &text, editor).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use collab_core::pairing::transport_url;
use collab_core::{HandshakeStep, SessionState};
use collab_types::{AuthToken, PairingResult, SessionId, UserId};

use crate::binding::{open_document, BindingRegistry, DocumentBinding, MergePrompt};
use crate::browser::{Browser, BrowserError, SystemBrowser};
use crate::cancel::{Cancelable, OperationError, ProgressSink};
use crate::config::{ClientConfig, EngineConfig};
use crate::engine::{EngineActor, EngineError, EngineFactory, EngineHandle, EngineHost};
use crate::error::ClientError;
use crate::handshake::PairingHandshake;
use crate::service::{HttpPairingService, PairingService};

/// Progress units for engine setup and transport connect.
const SETUP_WORK: u32 = 2;

/// Receives session state changes.
///
/// Called on the engine thread, in transport order, once per change.
pub trait SessionListener: Send + Sync {
    /// The session entered `state`.
    fn on_state_change(&self, state: SessionState);
}

impl<F> SessionListener for F
where
    F: Fn(SessionState) + Send + Sync,
{
    fn on_state_change(&self, state: SessionState) {
        self(state)
    }
}

/// Credentials of a paired session. The token is redacted in `Debug`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    session_id: SessionId,
    local_user_id: UserId,
    remote_user_id: UserId,
    auth_token: AuthToken,
    project: String,
}

impl Session {
    fn from_pairing(result: PairingResult, project: &str) -> Self {
        Self {
            session_id: result.session_id().clone(),
            local_user_id: result.local_user_id().clone(),
            remote_user_id: result.remote_user_id().clone(),
            auth_token: result.auth_token().clone(),
            project: result.project().unwrap_or(project).to_string(),
        }
    }

    /// Collaboration identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// This client's user id.
    pub fn local_user_id(&self) -> &UserId {
        &self.local_user_id
    }

    /// The partner's user id.
    pub fn remote_user_id(&self) -> &UserId {
        &self.remote_user_id
    }

    /// Token authenticating the transport.
    pub fn auth_token(&self) -> &AuthToken {
        &self.auth_token
    }

    /// Project the session shares.
    pub fn project(&self) -> &str {
        &self.project
    }
}

/// Everything a session needs from its host.
pub struct SessionEnv {
    /// Client configuration.
    pub config: ClientConfig,
    /// Pairing server.
    pub service: Arc<dyn PairingService>,
    /// Opens pairing and update pages.
    pub browser: Arc<dyn Browser>,
    /// Creates the sync engine on the engine thread.
    pub engine: EngineFactory,
    /// Merge UI for diverging documents.
    pub merge_prompt: Arc<dyn MergePrompt>,
}

impl SessionEnv {
    /// Environment talking to the configured server over HTTP and opening
    /// pages in the system browser.
    pub fn new(
        config: ClientConfig,
        engine: EngineFactory,
        merge_prompt: Arc<dyn MergePrompt>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let service = HttpPairingService::from_config(&config)?;
        Ok(Self {
            config,
            service: Arc::new(service),
            browser: Arc::new(SystemBrowser),
            engine,
            merge_prompt,
        })
    }

    /// Use another pairing service.
    pub fn with_service(mut self, service: Arc<dyn PairingService>) -> Self {
        self.service = service;
        self
    }

    /// Use another browser.
    pub fn with_browser(mut self, browser: Arc<dyn Browser>) -> Self {
        self.browser = browser;
        self
    }
}

/// Tears the session down when the transport ends on its own, then
/// forwards every change to the host's listener.
struct Teardown {
    session_id: SessionId,
    registry: Arc<BindingRegistry>,
    engine: EngineHandle,
    listener: Arc<dyn SessionListener>,
}

impl SessionListener for Teardown {
    fn on_state_change(&self, state: SessionState) {
        if state.is_terminal() {
            // None when stop() got here first
            if let Some(docs) = self.registry.shut() {
                tracing::info!(
                    session = %self.session_id,
                    documents = docs.len(),
                    "transport ended, tearing session down"
                );
                let queued = self.engine.exec(move |e| {
                    for doc in docs {
                        e.release(doc);
                    }
                });
                if queued.is_err() {
                    tracing::debug!(session = %self.session_id, "engine gone before teardown");
                }
                self.engine.halt();
            }
        }
        self.listener.on_state_change(state);
    }
}

/// A live paired session.
pub struct SessionConnection {
    session: Session,
    host: EngineHost,
    engine: EngineHandle,
    registry: Arc<BindingRegistry>,
    merge_prompt: Arc<dyn MergePrompt>,
    browser_notice: Option<BrowserError>,
}

impl SessionConnection {
    /// Pair for `project`, boot the engine and start the transport.
    ///
    /// The session is returned in [`SessionState::Connecting`]; the
    /// listener learns when the transport is up.
    ///
    /// # Errors
    ///
    /// Handshake failures, cancellation and engine bootstrap failures. No
    /// engine thread outlives a failed connect.
    pub async fn connect(
        project: &str,
        env: SessionEnv,
        listener: Arc<dyn SessionListener>,
        progress: &dyn ProgressSink,
    ) -> Result<Self, ClientError> {
        let SessionEnv {
            config,
            service,
            browser,
            engine: factory,
            merge_prompt,
        } = env;
        config.validate()?;

        progress.begin(HandshakeStep::total_weight() + SETUP_WORK);
        let outcome = PairingHandshake::new(&config, service.as_ref(), browser.as_ref())
            .run(project, progress)
            .await?;
        let session = Session::from_pairing(outcome.result, project);

        progress.sub_task("Setting up");
        let op = Cancelable::new(progress).with_poll_interval(config.poll_interval());
        let script_path = config.engine.script_path.as_str();
        let script = op
            .run(service.fetch_script(script_path))
            .await
            .map_err(|e| match e {
                OperationError::Cancelled => ClientError::Cancelled,
                other => ClientError::EngineBootstrap(EngineError::Script {
                    name: script_path.to_string(),
                    reason: other.to_string(),
                }),
            })?;

        let engine = EngineActor::spawn(factory)
            .await
            .map_err(ClientError::EngineBootstrap)?;
        if op.is_cancelled() {
            engine.halt();
            return Err(ClientError::Cancelled);
        }
        let registry = Arc::new(BindingRegistry::default());
        let teardown = Teardown {
            session_id: session.session_id.clone(),
            registry: registry.clone(),
            engine: engine.clone(),
            listener,
        };
        let host = EngineHost::new(session.session_id.clone(), Arc::new(teardown));

        let booted = bootstrap(&engine, &config.engine, script, host.clone()).await;
        if let Err(e) = booted {
            engine.halt();
            return Err(ClientError::EngineBootstrap(e));
        }
        if op.is_cancelled() {
            engine.halt();
            return Err(ClientError::Cancelled);
        }
        progress.worked(1);

        progress.sub_task("Connecting");
        if op.is_cancelled() {
            engine.halt();
            return Err(ClientError::Cancelled);
        }
        let url = transport_url(&config.server.ws_base, session.auth_token.expose());
        if let Err(e) = engine.call(move |e| e.connect(&url)).await {
            engine.halt();
            return Err(ClientError::EngineBootstrap(e));
        }
        progress.worked(1);

        tracing::info!(
            session = %session.session_id,
            project = %session.project,
            "session connecting"
        );
        Ok(Self {
            session,
            host,
            engine,
            registry,
            merge_prompt,
            browser_notice: outcome.browser_failure,
        })
    }

    /// Begin accepting document opens.
    pub fn start(&self) {
        if self.registry.activate() {
            tracing::info!(session = %self.session.session_id, "session started");
        }
    }

    /// Tear the session down.
    ///
    /// Releases every bound document, then asks the engine to disconnect;
    /// the engine thread exits once the disconnect completes. Calling this
    /// again does nothing.
    pub fn stop(&self) {
        let Some(docs) = self.registry.shut() else {
            tracing::debug!(session = %self.session.session_id, "session already stopped");
            return;
        };
        tracing::info!(
            session = %self.session.session_id,
            documents = docs.len(),
            "stopping session"
        );

        let engine = self.engine.clone();
        let host = self.host.clone();
        let queued = self.engine.exec(move |e| {
            for doc in docs {
                e.release(doc);
            }
            e.disconnect(Box::new(move || {
                host.connection_state("stopped", Some("session stopped"));
                engine.halt();
            }));
        });
        if queued.is_err() {
            tracing::warn!(session = %self.session.session_id, "engine already gone");
            self.host
                .connection_state("stopped", Some("engine already gone"));
        }
    }

    /// Send a keepalive. Failures are logged and otherwise ignored.
    pub fn ping(&self) {
        let session_id = self.session.session_id.clone();
        let queued = self.engine.exec(move |e| {
            if let Err(err) = e.ping(&session_id) {
                tracing::warn!(session = %session_id, error = %err, "ping failed");
            }
        });
        if let Err(err) = queued {
            tracing::warn!(session = %self.session.session_id, error = %err, "ping failed");
        }
    }

    /// Open `path` in the session and reconcile it with `local`.
    ///
    /// Returns once the binding is decided, which for diverging content
    /// means once the user has answered the merge prompt. Dropping the
    /// future gives the engine document back.
    ///
    /// # Errors
    ///
    /// [`ClientError::Stopped`] once the session is stopped or its
    /// transport has ended.
    pub async fn open<H>(
        &self,
        path: &str,
        local: &str,
        editor: H,
    ) -> Result<DocumentBinding<H>, ClientError> {
        if self.state().is_terminal() {
            return Err(ClientError::Stopped);
        }
        open_document(
            &self.engine,
            self.merge_prompt.as_ref(),
            &self.registry,
            path,
            local,
            editor,
        )
        .await
    }

    /// Point-in-time state.
    pub fn state(&self) -> SessionState {
        self.host.state()
    }

    /// Session credentials.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Set when the pairing page could not be opened.
    pub fn browser_notice(&self) -> Option<&BrowserError> {
        self.browser_notice.as_ref()
    }

    /// Wait until the engine thread has exited.
    pub async fn closed(&self) {
        self.engine.closed().await
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        if self.registry.shut().is_some() {
            tracing::debug!(session = %self.session.session_id, "session dropped without stop");
            self.engine.halt();
        }
    }
}

impl fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConnection")
            .field("session", &self.session)
            .field("state", &self.state())
            .finish()
    }
}

async fn bootstrap(
    engine: &EngineHandle,
    config: &EngineConfig,
    script: String,
    host: EngineHost,
) -> Result<(), EngineError> {
    let name = config.script_path.clone();
    let binding = config.host_binding.clone();
    let entry = config.bootstrap_entry.clone();
    tracing::debug!(script = %name, entry = %entry, "booting sync engine");

    engine
        .call(move |e| {
            e.load_script(&name, &script)?;
            e.bind_host(&binding, host)?;
            e.invoke(&entry, &[])?;
            Ok(())
        })
        .await
}
