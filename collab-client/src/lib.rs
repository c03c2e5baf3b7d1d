//! # collab-client
//!
//! Session client for Duet paired collaborative editing.
//!
//! This is the library a host editor embeds to pair with a partner and share
//! documents in real time.
//!
//! ## Features
//!
//! - **Pairing Handshake**: version check, browser hand-off and long-poll for
//!   a partner, every step cancelable
//! - **Engine Actor**: the single-threaded sync engine runs on its own thread
//!   behind a message channel
//! - **Document Reconciliation**: files join a session automatically when
//!   both sides agree, otherwise through one merge prompt
//! - **Pure State Machine**: session lifecycle comes from collab-core
//!
//! ## Example
//!
//! ```ignore
//! use duet_collab_client::{ClientConfig, Progress, SessionConnection, SessionEnv};
//!
//! let config = ClientConfig::load(Path::new("duet.toml"))?;
//! let env = SessionEnv::new(config, engine_factory, merge_prompt)?;
//! let progress = Progress::new();
//!
//! let session = SessionConnection::connect("my-project", env, listener, &progress).await?;
//! session.start();
//!
//! let binding = session.open("src/lib.rs", &local_text, editor).await?;
//! if binding.is_bound() {
//!     // edits now flow through the engine
//! }
//! session.stop();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binding;
pub mod browser;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod service;
pub mod session;

pub use binding::{DocumentBinding, MergePrompt, MergeReply, MergeRequest};
pub use browser::{Browser, BrowserError, RecordingBrowser, SystemBrowser};
pub use cancel::{Cancelable, OperationError, Progress, ProgressSink, DEFAULT_POLL_INTERVAL};
pub use config::{ClientConfig, ConfigError};
pub use engine::{
    DocHandle, EngineActor, EngineError, EngineFactory, EngineHandle, EngineHost, MockEngine,
    SyncEngine,
};
pub use error::ClientError;
pub use handshake::{HandshakeOutcome, PairingHandshake};
pub use service::{HttpPairingService, MockPairingService, PairingService, ServiceError};
pub use session::{Session, SessionConnection, SessionEnv, SessionListener};

// Core types hosts need alongside the client
pub use collab_core::{MergeDecision, Resolution, SessionState};
