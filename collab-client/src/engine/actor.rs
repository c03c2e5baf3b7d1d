//! Single-threaded engine actor.
//!
//! The engine is created and used on one named OS thread. Other threads talk
//! to it by sending boxed closures over an unbounded channel; the thread runs
//! them in arrival order until halted.

use tokio::sync::{mpsc, oneshot};

use super::{EngineError, SyncEngine};

/// Name of the engine thread.
pub const ENGINE_THREAD_NAME: &str = "duet-sync-engine";

/// Creates the engine on the engine thread.
pub type EngineFactory = Box<dyn FnOnce() -> Result<Box<dyn SyncEngine>, EngineError> + Send>;

type Job = Box<dyn FnOnce(&mut dyn SyncEngine) + Send>;

enum Message {
    Exec(Job),
    Halt,
}

/// Spawns engine threads.
pub struct EngineActor;

impl EngineActor {
    /// Start the engine thread and wait until the factory has run.
    pub async fn spawn(factory: EngineFactory) -> Result<EngineHandle, EngineError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name(ENGINE_THREAD_NAME.to_string())
            .spawn(move || {
                let mut engine = match factory() {
                    Ok(engine) => {
                        let _ = ready_tx.send(Ok(()));
                        engine
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                tracing::debug!("engine thread started");

                while let Some(message) = rx.blocking_recv() {
                    match message {
                        Message::Exec(job) => job(engine.as_mut()),
                        Message::Halt => break,
                    }
                }

                engine.shutdown();
                tracing::debug!("engine thread stopped");
            })
            .map_err(|e| EngineError::Create(e.to_string()))?;

        ready_rx.await.map_err(|_| EngineError::Stopped)??;
        Ok(EngineHandle { tx })
    }
}

/// Sends work to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl EngineHandle {
    /// Queue `job` without waiting for it.
    pub fn exec<F>(&self, job: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut dyn SyncEngine) + Send + 'static,
    {
        self.tx
            .send(Message::Exec(Box::new(job)))
            .map_err(|_| EngineError::Stopped)
    }

    /// Run `job` on the engine thread and await its result.
    pub async fn call<T, F>(&self, job: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut dyn SyncEngine) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.exec(move |engine| {
            let _ = reply_tx.send(job(engine));
        })?;
        reply_rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Stop the thread once the jobs queued before this call have run.
    pub fn halt(&self) {
        if self.tx.send(Message::Halt).is_err() {
            tracing::trace!("engine thread already gone");
        }
    }

    /// Whether the engine thread is still accepting work.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Wait until the engine thread has exited.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    #[tokio::test]
    async fn call_runs_on_engine_thread() {
        let engine = MockEngine::new();
        let handle = EngineActor::spawn(engine.factory()).await.unwrap();

        let name = handle
            .call(|_engine| Ok(std::thread::current().name().map(str::to_string)))
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some(ENGINE_THREAD_NAME));
    }

    #[tokio::test]
    async fn jobs_run_in_order() {
        let engine = MockEngine::new();
        let handle = EngineActor::spawn(engine.factory()).await.unwrap();

        handle
            .exec(|e| {
                let _ = e.load_script("a.js", "1");
            })
            .unwrap();
        handle
            .exec(|e| {
                let _ = e.load_script("b.js", "2");
            })
            .unwrap();
        handle.call(|_| Ok(())).await.unwrap();

        assert_eq!(engine.calls(), vec!["load_script a.js", "load_script b.js"]);
    }

    #[tokio::test]
    async fn call_propagates_engine_errors() {
        let engine = MockEngine::new();
        engine.fail_next_invoke("no such function");
        let handle = EngineActor::spawn(engine.factory()).await.unwrap();

        let result = handle.call(|e| e.invoke("sharedb", &[])).await;
        assert!(matches!(result, Err(EngineError::Invoke { .. })));
    }

    #[tokio::test]
    async fn factory_failure_is_reported() {
        let factory: EngineFactory = Box::new(|| Err(EngineError::Create("no runtime".into())));
        assert!(matches!(
            EngineActor::spawn(factory).await,
            Err(EngineError::Create(_))
        ));
    }

    #[tokio::test]
    async fn halt_shuts_down_engine() {
        let engine = MockEngine::new();
        let handle = EngineActor::spawn(engine.factory()).await.unwrap();

        handle.halt();
        handle.closed().await;

        assert!(!handle.is_running());
        assert!(engine.is_shut_down());
        assert!(matches!(
            handle.call(|_| Ok(())).await,
            Err(EngineError::Stopped)
        ));
    }
}
