//! Mock sync engine for testing.
//!
//! Records every facade call, serves configurable remote content for opened
//! documents and lets tests play the transport by emitting lifecycle events
//! through the bound host.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use collab_types::SessionId;
use serde_json::Value;

use super::{
    CompletionCallback, DocCallback, DocHandle, EngineError, EngineFactory, EngineHost,
    SyncEngine,
};

/// Mock engine for testing.
///
/// Clones share state, so a test keeps one clone while the engine thread
/// owns another.
#[derive(Debug, Default, Clone)]
pub struct MockEngine {
    inner: Arc<Mutex<MockEngineInner>>,
}

#[derive(Default)]
struct MockEngineInner {
    calls: Vec<String>,
    host: Option<EngineHost>,
    connected_url: Option<String>,
    remote: HashMap<String, String>,
    next_doc: u64,
    attached: Vec<(DocHandle, String)>,
    released: Vec<DocHandle>,
    pings: Vec<SessionId>,
    hold_opens: bool,
    held: Vec<(DocHandle, String, DocCallback)>,
    shut_down: bool,
    fail_next_load: Option<String>,
    fail_next_bind: Option<String>,
    fail_next_invoke: Option<String>,
    fail_next_connect: Option<String>,
    fail_next_ping: Option<String>,
    fail_next_open: Option<String>,
    fail_next_attach: Option<String>,
}

impl std::fmt::Debug for MockEngineInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngineInner")
            .field("calls", &self.calls)
            .field("connected_url", &self.connected_url)
            .field("held", &self.held.len())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

impl MockEngine {
    /// Create a new mock engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory handing a clone of this mock to the engine thread.
    pub fn factory(&self) -> EngineFactory {
        let engine = self.clone();
        Box::new(move || Ok(Box::new(engine) as Box<dyn SyncEngine>))
    }

    /// Shared content for `path`. Unset paths echo the local content.
    pub fn set_remote(&self, path: &str, content: &str) {
        self.lock()
            .remote
            .insert(path.to_string(), content.to_string());
    }

    /// Keep open callbacks pending until [`resolve_held`](Self::resolve_held).
    pub fn hold_opens(&self, hold: bool) {
        self.lock().hold_opens = hold;
    }

    /// Resolve every held open. Returns how many were resolved.
    pub fn resolve_held(&self) -> usize {
        let held = std::mem::take(&mut self.lock().held);
        let count = held.len();
        for (doc, remote, callback) in held {
            callback(doc, remote);
        }
        count
    }

    /// Drop every held open without answering, as an engine that lost the
    /// document would. Returns how many were dropped.
    pub fn drop_held(&self) -> usize {
        let held = std::mem::take(&mut self.lock().held);
        held.len()
    }

    /// Play the transport: report a lifecycle event to the bound host.
    ///
    /// Returns false if no host is bound yet.
    pub fn emit_state(&self, event: &str, reason: Option<&str>) -> bool {
        let host = self.lock().host.clone();
        match host {
            Some(host) => {
                host.connection_state(event, reason);
                true
            }
            None => false,
        }
    }

    /// Every facade call so far, as `"<operation> <argument>"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// URL passed to `connect`.
    pub fn connected_url(&self) -> Option<String> {
        self.lock().connected_url.clone()
    }

    /// Documents attached with their accepted content.
    pub fn attached(&self) -> Vec<(DocHandle, String)> {
        self.lock().attached.clone()
    }

    /// Documents released so far.
    pub fn released(&self) -> Vec<DocHandle> {
        self.lock().released.clone()
    }

    /// Sessions pinged so far.
    pub fn pings(&self) -> Vec<SessionId> {
        self.lock().pings.clone()
    }

    /// Whether the engine thread has shut the engine down.
    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    /// Cause the next `load_script` to fail.
    pub fn fail_next_load(&self, error: &str) {
        self.lock().fail_next_load = Some(error.to_string());
    }

    /// Cause the next `bind_host` to fail.
    pub fn fail_next_bind(&self, error: &str) {
        self.lock().fail_next_bind = Some(error.to_string());
    }

    /// Cause the next `invoke` to fail.
    pub fn fail_next_invoke(&self, error: &str) {
        self.lock().fail_next_invoke = Some(error.to_string());
    }

    /// Cause the next `connect` to fail.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next `ping` to fail.
    pub fn fail_next_ping(&self, error: &str) {
        self.lock().fail_next_ping = Some(error.to_string());
    }

    /// Cause the next `open` to fail.
    pub fn fail_next_open(&self, error: &str) {
        self.lock().fail_next_open = Some(error.to_string());
    }

    /// Cause the next `attach` to fail.
    pub fn fail_next_attach(&self, error: &str) {
        self.lock().fail_next_attach = Some(error.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, MockEngineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SyncEngine for MockEngine {
    fn load_script(&mut self, name: &str, _source: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.calls.push(format!("load_script {}", name));

        // Check for forced failure
        if let Some(reason) = inner.fail_next_load.take() {
            return Err(EngineError::Script {
                name: name.to_string(),
                reason,
            });
        }
        Ok(())
    }

    fn bind_host(&mut self, name: &str, host: EngineHost) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.calls.push(format!("bind_host {}", name));

        if let Some(reason) = inner.fail_next_bind.take() {
            return Err(EngineError::Host {
                name: name.to_string(),
                reason,
            });
        }
        inner.host = Some(host);
        Ok(())
    }

    fn invoke(&mut self, function: &str, _args: &[Value]) -> Result<Value, EngineError> {
        let mut inner = self.lock();
        inner.calls.push(format!("invoke {}", function));

        if let Some(reason) = inner.fail_next_invoke.take() {
            return Err(EngineError::Invoke {
                function: function.to_string(),
                reason,
            });
        }
        Ok(Value::Null)
    }

    fn connect(&mut self, url: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.calls.push(format!("connect {}", url));

        if let Some(reason) = inner.fail_next_connect.take() {
            return Err(EngineError::Connect(reason));
        }
        inner.connected_url = Some(url.to_string());
        Ok(())
    }

    fn ping(&mut self, session: &SessionId) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.calls.push(format!("ping {}", session));

        if let Some(reason) = inner.fail_next_ping.take() {
            return Err(EngineError::Call {
                operation: "ping",
                reason,
            });
        }
        inner.pings.push(session.clone());
        Ok(())
    }

    fn open(
        &mut self,
        path: &str,
        local: &str,
        on_resolved: DocCallback,
    ) -> Result<(), EngineError> {
        let (doc, remote) = {
            let mut inner = self.lock();
            inner.calls.push(format!("open {}", path));

            if let Some(reason) = inner.fail_next_open.take() {
                return Err(EngineError::Call {
                    operation: "open",
                    reason,
                });
            }

            inner.next_doc += 1;
            let doc = DocHandle::new(inner.next_doc);
            let remote = inner
                .remote
                .get(path)
                .cloned()
                .unwrap_or_else(|| local.to_string());

            if inner.hold_opens {
                inner.held.push((doc, remote, on_resolved));
                return Ok(());
            }
            (doc, remote)
        };

        // Callback runs outside the lock
        on_resolved(doc, remote);
        Ok(())
    }

    fn attach(&mut self, doc: DocHandle, content: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.calls.push(format!("attach {}", doc));

        if let Some(reason) = inner.fail_next_attach.take() {
            return Err(EngineError::Call {
                operation: "attach",
                reason,
            });
        }
        inner.attached.push((doc, content.to_string()));
        Ok(())
    }

    fn release(&mut self, doc: DocHandle) {
        let mut inner = self.lock();
        inner.calls.push(format!("release {}", doc));
        inner.released.push(doc);
    }

    fn disconnect(&mut self, on_complete: CompletionCallback) {
        let host = {
            let mut inner = self.lock();
            inner.calls.push("disconnect".to_string());
            inner.connected_url = None;
            inner.host.clone()
        };

        if let Some(host) = host {
            host.connection_state("stopped", Some("disconnect requested"));
        }
        on_complete();
    }

    fn shutdown(&mut self) {
        self.lock().shut_down = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_core::SessionState;
    use std::sync::mpsc;

    fn host_with_log() -> (EngineHost, Arc<Mutex<Vec<SessionState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let host = EngineHost::new(
            SessionId::new("s1"),
            Arc::new(move |state: SessionState| sink.lock().unwrap().push(state)),
        );
        (host, seen)
    }

    #[test]
    fn open_echoes_local_by_default() {
        let mut engine = MockEngine::new();
        let (tx, rx) = mpsc::channel();
        engine
            .open("a.txt", "abc", Box::new(move |doc, remote| tx.send((doc, remote)).unwrap()))
            .unwrap();

        let (doc, remote) = rx.recv().unwrap();
        assert_eq!(doc, DocHandle::new(1));
        assert_eq!(remote, "abc");
    }

    #[test]
    fn open_serves_configured_remote() {
        let mut engine = MockEngine::new();
        engine.set_remote("a.txt", "xyz");
        let (tx, rx) = mpsc::channel();
        engine
            .open("a.txt", "abc", Box::new(move |_, remote| tx.send(remote).unwrap()))
            .unwrap();
        assert_eq!(rx.recv().unwrap(), "xyz");
    }

    #[test]
    fn held_opens_resolve_on_demand() {
        let mut engine = MockEngine::new();
        engine.hold_opens(true);
        let (tx, rx) = mpsc::channel();
        engine
            .open("a.txt", "abc", Box::new(move |_, remote| tx.send(remote).unwrap()))
            .unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(engine.resolve_held(), 1);
        assert_eq!(rx.recv().unwrap(), "abc");
    }

    #[test]
    fn dropped_holds_never_answer() {
        let mut engine = MockEngine::new();
        engine.hold_opens(true);
        let (tx, rx) = mpsc::channel::<String>();
        engine
            .open("a.txt", "abc", Box::new(move |_, remote| tx.send(remote).unwrap()))
            .unwrap();

        assert_eq!(engine.drop_held(), 1);
        assert_eq!(engine.resolve_held(), 0);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn forced_failures_apply_once() {
        let mut engine = MockEngine::new();
        engine.fail_next_connect("refused");
        assert!(engine.connect("wss://h/tok").is_err());
        assert!(engine.connected_url().is_none());

        engine.connect("wss://h/tok").unwrap();
        assert_eq!(engine.connected_url().as_deref(), Some("wss://h/tok"));
    }

    #[test]
    fn emit_requires_bound_host() {
        let mut engine = MockEngine::new();
        assert!(!engine.emit_state("connected", None));

        let (host, seen) = host_with_log();
        engine.bind_host("session", host).unwrap();
        assert!(engine.emit_state("connected", None));
        assert_eq!(*seen.lock().unwrap(), vec![SessionState::Connected]);
    }

    #[test]
    fn disconnect_reports_stopped_then_completes() {
        let mut engine = MockEngine::new();
        let (host, seen) = host_with_log();
        engine.bind_host("session", host.clone()).unwrap();
        engine.emit_state("connected", None);

        let (tx, rx) = mpsc::channel();
        engine.disconnect(Box::new(move || tx.send(()).unwrap()));

        rx.recv().unwrap();
        assert_eq!(host.state(), SessionState::Disconnected);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![SessionState::Connected, SessionState::Disconnected]
        );
    }

    #[test]
    fn calls_are_recorded() {
        let mut engine = MockEngine::new();
        engine.load_script("/public/sharedb.js", "").unwrap();
        engine.invoke("sharedb", &[]).unwrap();
        engine.ping(&SessionId::new("s1")).unwrap();
        engine.release(DocHandle::new(4));

        assert_eq!(
            engine.calls(),
            vec![
                "load_script /public/sharedb.js",
                "invoke sharedb",
                "ping s1",
                "release doc#4"
            ]
        );
        assert_eq!(engine.pings(), vec![SessionId::new("s1")]);
    }
}
