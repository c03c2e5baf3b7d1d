//! Document bindings.
//!
//! Opening a file in a session asks the engine for the shared content of
//! that path and reconciles it with what the local editor holds:
//! - identical content binds immediately
//! - differing content is handed to the host's [`MergePrompt`] exactly once,
//!   and the user's answer decides the outcome
//!
//! A cancelled reconciliation releases the engine document and leaves the
//! file unbound; the session itself is unaffected.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use collab_core::{MergeDecision, Resolution};
use tokio::sync::oneshot;

use crate::engine::{DocHandle, EngineHandle};
use crate::error::ClientError;

/// A file opened in a session.
///
/// The resolution is fixed when the binding is returned.
#[derive(Debug)]
pub struct DocumentBinding<H> {
    path: String,
    local_snapshot: String,
    editor: H,
    doc: DocHandle,
    resolution: Resolution,
}

impl<H> DocumentBinding<H> {
    /// Path relative to the project root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Local content at the time of opening.
    pub fn local_snapshot(&self) -> &str {
        &self.local_snapshot
    }

    /// The host editor handle.
    pub fn editor(&self) -> &H {
        &self.editor
    }

    /// Engine document handle. Released already when the binding was
    /// cancelled.
    pub fn doc(&self) -> DocHandle {
        self.doc
    }

    /// How reconciliation ended.
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Whether the file is now shared.
    pub fn is_bound(&self) -> bool {
        self.resolution.is_accepted()
    }

    /// Content the shared document started from, if bound.
    pub fn content(&self) -> Option<&str> {
        self.resolution.accepted_content()
    }
}

/// A merge the user has to decide.
#[derive(Debug)]
pub struct MergeRequest {
    /// Path of the diverging file.
    pub path: String,
    /// Local editor content.
    pub local: String,
    /// Shared session content.
    pub remote: String,
    /// Where the answer goes.
    pub reply: MergeReply,
}

/// One-shot answer to a [`MergeRequest`]. Dropping it cancels.
#[derive(Debug)]
pub struct MergeReply {
    tx: oneshot::Sender<MergeDecision>,
}

impl MergeReply {
    /// Keep the local content.
    pub fn keep_local(self) {
        self.decide(MergeDecision::KeepLocal);
    }

    /// Take the shared content.
    pub fn keep_remote(self) {
        self.decide(MergeDecision::KeepRemote);
    }

    /// Use a hand-merged text.
    pub fn accept_merged(self, text: impl Into<String>) {
        self.decide(MergeDecision::Merged(text.into()));
    }

    /// Do not bind the file.
    pub fn cancel(self) {
        self.decide(MergeDecision::Cancel);
    }

    fn decide(self, decision: MergeDecision) {
        if self.tx.send(decision).is_err() {
            tracing::debug!("merge answered after the open was abandoned");
        }
    }
}

/// Host-side merge UI.
pub trait MergePrompt: Send + Sync {
    /// Show `request` to the user. Must not block; answer through
    /// `request.reply` whenever the user decides.
    fn request_merge(&self, request: MergeRequest);
}

impl<F> MergePrompt for F
where
    F: Fn(MergeRequest) + Send + Sync,
{
    fn request_merge(&self, request: MergeRequest) {
        self(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    Active,
    Stopped,
}

#[derive(Debug, Default)]
struct RegistryInner {
    phase: Phase,
    pending: HashSet<String>,
    live: Vec<DocHandle>,
}

/// Tracks opens in flight and bound documents of one session.
#[derive(Debug, Default)]
pub(crate) struct BindingRegistry {
    inner: Mutex<RegistryInner>,
}

impl BindingRegistry {
    /// Allow opens. No effect once stopped.
    pub(crate) fn activate(&self) -> bool {
        let mut inner = self.lock();
        if inner.phase == Phase::Idle {
            inner.phase = Phase::Active;
            true
        } else {
            false
        }
    }

    /// Claim `path` for an open.
    pub(crate) fn begin(&self, path: &str) -> Result<OpenGuard<'_>, ClientError> {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Idle => return Err(ClientError::NotStarted),
            Phase::Stopped => return Err(ClientError::Stopped),
            Phase::Active => {}
        }
        if !inner.pending.insert(path.to_string()) {
            return Err(ClientError::OpenInProgress(path.to_string()));
        }
        Ok(OpenGuard {
            registry: self,
            path: path.to_string(),
        })
    }

    /// Record a bound document. False if the session stopped meanwhile.
    pub(crate) fn register(&self, doc: DocHandle) -> bool {
        let mut inner = self.lock();
        if inner.phase != Phase::Active {
            return false;
        }
        inner.live.push(doc);
        true
    }

    /// Stop accepting opens and hand back every bound document.
    /// `None` if already stopped.
    pub(crate) fn shut(&self) -> Option<Vec<DocHandle>> {
        let mut inner = self.lock();
        if inner.phase == Phase::Stopped {
            return None;
        }
        inner.phase = Phase::Stopped;
        Some(std::mem::take(&mut inner.live))
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the path claim when the open finishes, however it finishes.
pub(crate) struct OpenGuard<'a> {
    registry: &'a BindingRegistry,
    path: String,
}

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().pending.remove(&self.path);
    }
}

/// Run the open/reconcile protocol for one file.
pub(crate) async fn open_document<H>(
    engine: &EngineHandle,
    prompt: &dyn MergePrompt,
    registry: &BindingRegistry,
    path: &str,
    local: &str,
    editor: H,
) -> Result<DocumentBinding<H>, ClientError> {
    let _claim = registry.begin(path)?;
    tracing::debug!(path, "opening document");

    let (resolved_tx, resolved_rx) = oneshot::channel();
    let (engine_path, engine_local) = (path.to_string(), local.to_string());
    let owner = engine.clone();
    engine
        .call(move |e| {
            e.open(
                &engine_path,
                &engine_local,
                Box::new(move |doc, remote| {
                    // The open was abandoned before the engine answered
                    if let Err((doc, _)) = resolved_tx.send((doc, remote)) {
                        release(&owner, doc);
                    }
                }),
            )
        })
        .await
        .map_err(ClientError::from_engine)?;
    let (doc, remote) = resolved_rx.await.map_err(|_| ClientError::EngineStopped)?;
    let held = HeldDoc::new(engine, doc);

    let resolution = match Resolution::compare(local, &remote) {
        pending @ Resolution::PendingMerge { .. } => {
            let decision = ask(prompt, path, local, remote).await;
            pending.resume(decision).unwrap_or(Resolution::Cancelled)
        }
        decided => decided,
    };

    match resolution.accepted_content() {
        Some(content) => {
            let content = content.to_string();
            engine
                .call(move |e| e.attach(doc, &content))
                .await
                .map_err(ClientError::from_engine)?;
            if !registry.register(doc) {
                return Err(ClientError::Stopped);
            }
            held.keep();
            tracing::info!(path, %doc, "document bound");
        }
        None => tracing::info!(path, "reconciliation abandoned"),
    }

    Ok(DocumentBinding {
        path: path.to_string(),
        local_snapshot: local.to_string(),
        editor,
        doc,
        resolution,
    })
}

/// An engine document not yet owned by the registry. Released on drop
/// unless kept, so an abandoned or failed open never leaks it.
struct HeldDoc<'a> {
    engine: &'a EngineHandle,
    doc: Option<DocHandle>,
}

impl<'a> HeldDoc<'a> {
    fn new(engine: &'a EngineHandle, doc: DocHandle) -> Self {
        Self {
            engine,
            doc: Some(doc),
        }
    }

    /// The registry owns the document now.
    fn keep(mut self) {
        self.doc = None;
    }
}

impl Drop for HeldDoc<'_> {
    fn drop(&mut self) {
        if let Some(doc) = self.doc.take() {
            release(self.engine, doc);
        }
    }
}

async fn ask(prompt: &dyn MergePrompt, path: &str, local: &str, remote: String) -> MergeDecision {
    let (tx, rx) = oneshot::channel();
    prompt.request_merge(MergeRequest {
        path: path.to_string(),
        local: local.to_string(),
        remote,
        reply: MergeReply { tx },
    });
    // A dropped reply counts as cancel
    rx.await.unwrap_or(MergeDecision::Cancel)
}

fn release(engine: &EngineHandle, doc: DocHandle) {
    if engine.exec(move |e| e.release(doc)).is_err() {
        tracing::debug!(%doc, "engine gone before release");
    }
}
