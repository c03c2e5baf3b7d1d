//! Cancelable operations.
//!
//! Every network step of a Duet session can take arbitrarily long (the
//! pairing long-poll waits for a human on the other end). [`Cancelable`]
//! wraps such a step so the caller's progress/cancel signal interrupts it.
//!
//! # Design
//!
//! An operation owns a [`CancellationToken`]. While the work is pending, a
//! monitor selects over:
//! - the work itself
//! - the token (external interrupt)
//! - a ticker at [`ProgressSink::poll_interval`], on which the sink's
//!   `is_cancelled()` flag is sampled
//!
//! Once the token fires the operation resolves [`OperationError::Cancelled`]
//! and any result the work produces afterwards is dropped.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Poll interval used when a sink does not choose one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Smallest interval the monitor will tick at.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Progress reporting and cancellation signal supplied by the caller.
///
/// Host editors usually adapt their own progress monitor to this trait.
pub trait ProgressSink: Send + Sync {
    /// Whether the user asked to cancel.
    fn is_cancelled(&self) -> bool;

    /// How often pending work samples [`is_cancelled`](Self::is_cancelled).
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Announce the total amount of work.
    fn begin(&self, total_work: u32);

    /// Name the step now running.
    fn sub_task(&self, name: &str);

    /// Credit completed work.
    fn worked(&self, units: u32);

    /// A token that fires on cancellation, for sinks that can push the
    /// signal instead of waiting to be polled.
    fn cancel_token(&self) -> Option<CancellationToken> {
        None
    }
}

/// Errors from a cancelable operation.
#[derive(Debug, Error)]
pub enum OperationError<E> {
    /// Cancelled before the work delivered a result.
    #[error("operation cancelled")]
    Cancelled,

    /// The work itself failed.
    #[error("{0}")]
    Failed(E),

    /// The worker died without producing a result.
    #[error("operation aborted: {0}")]
    Aborted(String),
}

impl<E> OperationError<E> {
    /// Check if this is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Ready-made [`ProgressSink`] backed by a [`CancellationToken`].
#[derive(Debug)]
pub struct Progress {
    token: CancellationToken,
    poll_interval: Duration,
    total: AtomicU32,
    done: AtomicU32,
    task: Mutex<Option<String>>,
}

impl Progress {
    /// Create a progress sink that is not cancelled.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            total: AtomicU32::new(0),
            done: AtomicU32::new(0),
            task: Mutex::new(None),
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Request cancellation of everything running under this sink.
    pub fn cancel(&self) {
        tracing::debug!("cancellation requested");
        self.token.cancel();
    }

    /// Total work announced by `begin`.
    pub fn total(&self) -> u32 {
        self.total.load(Ordering::Acquire)
    }

    /// Work credited so far.
    pub fn done(&self) -> u32 {
        self.done.load(Ordering::Acquire)
    }

    /// Label of the running step.
    pub fn current_task(&self) -> Option<String> {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for Progress {
    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn begin(&self, total_work: u32) {
        self.total.store(total_work, Ordering::Release);
        self.done.store(0, Ordering::Release);
        tracing::debug!(total_work, "progress started");
    }

    fn sub_task(&self, name: &str) {
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(name.to_owned());
        tracing::debug!(task = name, "progress step");
    }

    fn worked(&self, units: u32) {
        let done = self.done.fetch_add(units, Ordering::AcqRel) + units;
        tracing::debug!(done, total = self.total(), "progress");
    }

    fn cancel_token(&self) -> Option<CancellationToken> {
        Some(self.token.clone())
    }
}

/// One interruptible operation scoped to a progress sink.
pub struct Cancelable<'a> {
    progress: &'a dyn ProgressSink,
    token: CancellationToken,
    poll_interval: Duration,
}

impl<'a> Cancelable<'a> {
    /// Create an operation that follows `progress`.
    pub fn new(progress: &'a dyn ProgressSink) -> Self {
        let token = progress
            .cancel_token()
            .map(|parent| parent.child_token())
            .unwrap_or_default();
        Self {
            progress,
            token,
            poll_interval: progress.poll_interval().max(MIN_POLL_INTERVAL),
        }
    }

    /// Sample the sink at least every `interval`. The sink's own interval
    /// still applies when it is shorter.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = self.poll_interval.min(interval).max(MIN_POLL_INTERVAL);
        self
    }

    /// How often pending work samples the sink.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The token handed to blocking work.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Interrupt the operation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the operation (or its sink) has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        if self.progress.is_cancelled() {
            self.token.cancel();
        }
        self.token.is_cancelled()
    }

    /// Await `work` unless cancelled first.
    pub async fn run<T, E, F>(&self, work: F) -> Result<T, OperationError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        match self.wait(work).await {
            Some(result) => result.map_err(OperationError::Failed),
            None => Err(OperationError::Cancelled),
        }
    }

    /// Run blocking `work` on the blocking pool and await its result.
    ///
    /// The work receives the operation token and should check it at safe
    /// points. If the operation is cancelled first, the worker's eventual
    /// result is discarded.
    pub async fn run_blocking<T, E, W>(&self, work: W) -> Result<T, OperationError<E>>
    where
        W: FnOnce(&CancellationToken) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if self.is_cancelled() {
            return Err(OperationError::Cancelled);
        }

        let token = self.token.clone();
        let (tx, rx) = oneshot::channel();
        let worker = tokio::task::spawn_blocking(move || {
            let result = work(&token);
            if tx.send(result).is_err() {
                tracing::trace!("discarding result of cancelled operation");
            }
        });

        match self.wait(rx).await {
            Some(Ok(result)) => result.map_err(OperationError::Failed),
            Some(Err(_)) => {
                // Sender dropped without a value: the worker panicked.
                let reason = match worker.await {
                    Err(e) if e.is_panic() => panic_message(e.into_panic()),
                    Err(e) => e.to_string(),
                    Ok(()) => "worker exited without a result".to_string(),
                };
                Err(OperationError::Aborted(reason))
            }
            None => Err(OperationError::Cancelled),
        }
    }

    async fn wait<F: Future>(&self, work: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(work);

        loop {
            tokio::select! {
                // Cancellation wins ties with completion
                biased;
                _ = self.token.cancelled() => {
                    tracing::debug!("operation cancelled");
                    return None;
                }
                output = &mut work => return Some(output),
                _ = ticker.tick() => {
                    if self.progress.is_cancelled() {
                        self.token.cancel();
                    }
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    /// Sink that only exposes a polled flag, like most editor monitors.
    #[derive(Default)]
    struct FlagSink {
        cancelled: AtomicBool,
    }

    impl ProgressSink for FlagSink {
        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
        fn poll_interval(&self) -> Duration {
            Duration::from_millis(5)
        }
        fn begin(&self, _total_work: u32) {}
        fn sub_task(&self, _name: &str) {}
        fn worked(&self, _units: u32) {}
    }

    // ===========================================
    // Async work
    // ===========================================

    #[tokio::test]
    async fn completed_work_is_delivered() {
        let progress = Progress::new();
        let op = Cancelable::new(&progress);

        let result: Result<u32, OperationError<String>> = op.run(async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn failed_work_is_not_cancellation() {
        let progress = Progress::new();
        let op = Cancelable::new(&progress);

        let result: Result<(), _> = op.run(async { Err("boom".to_string()) }).await;
        match result {
            Err(OperationError::Failed(e)) => assert_eq!(e, "boom"),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancelled_before_start_never_runs() {
        let progress = Progress::new();
        progress.cancel();
        let op = Cancelable::new(&progress);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let result: Result<(), OperationError<()>> = op
            .run(async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn configured_interval_only_shortens_polling() {
        let progress = Progress::new();
        let fast = Cancelable::new(&progress).with_poll_interval(Duration::from_millis(5));
        assert_eq!(fast.poll_interval(), Duration::from_millis(5));

        let slow = Cancelable::new(&progress).with_poll_interval(Duration::from_secs(1));
        assert_eq!(slow.poll_interval(), DEFAULT_POLL_INTERVAL);

        let zero = Cancelable::new(&progress).with_poll_interval(Duration::ZERO);
        assert_eq!(zero.poll_interval(), MIN_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn progress_cancel_interrupts_pending_work() {
        let progress = Arc::new(Progress::new());
        let canceller = progress.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let op = Cancelable::new(progress.as_ref());
        let result: Result<(), OperationError<()>> = op.run(std::future::pending()).await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn polled_flag_interrupts_pending_work() {
        let sink = Arc::new(FlagSink::default());
        let flag = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.cancelled.store(true, Ordering::SeqCst);
        });

        let op = Cancelable::new(sink.as_ref());
        let result: Result<(), OperationError<()>> = op.run(std::future::pending()).await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(op.token().is_cancelled());
    }

    #[tokio::test]
    async fn operation_cancel_does_not_cancel_sink() {
        let progress = Progress::new();
        let op = Cancelable::new(&progress);
        op.cancel();

        let result: Result<(), OperationError<()>> = op.run(async { Ok(()) }).await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(!progress.is_cancelled());
    }

    // ===========================================
    // Blocking work
    // ===========================================

    #[tokio::test]
    async fn blocking_work_is_delivered() {
        let progress = Progress::new();
        let op = Cancelable::new(&progress);

        let result = op
            .run_blocking(|_token| Ok::<_, String>("done".to_string()))
            .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn late_blocking_result_is_discarded() {
        let sink = Arc::new(FlagSink::default());
        let observed_cancel = Arc::new(AtomicBool::new(false));
        let observed = observed_cancel.clone();
        let flag = sink.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.cancelled.store(true, Ordering::SeqCst);
        });

        let op = Cancelable::new(sink.as_ref());
        let result = op
            .run_blocking(move |token| {
                // Simulated long call that ignores the token until it returns.
                std::thread::sleep(Duration::from_millis(150));
                observed.store(token.is_cancelled(), Ordering::SeqCst);
                Ok::<_, ()>(7)
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());

        // Give the worker time to finish; its value must go nowhere.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(observed_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_worker_is_aborted() {
        let progress = Progress::new();
        let op = Cancelable::new(&progress);

        let result: Result<(), OperationError<()>> =
            op.run_blocking(|_token| panic!("engine exploded")).await;
        match result {
            Err(OperationError::Aborted(reason)) => assert!(reason.contains("engine exploded")),
            other => panic!("expected Aborted, got {:?}", other),
        }
    }

    // ===========================================
    // Progress bookkeeping
    // ===========================================

    #[test]
    fn progress_tracks_work_and_task() {
        let progress = Progress::new();
        progress.begin(5);
        progress.sub_task("Authenticating");
        progress.worked(1);
        progress.worked(2);

        assert_eq!(progress.total(), 5);
        assert_eq!(progress.done(), 3);
        assert_eq!(progress.current_task().as_deref(), Some("Authenticating"));
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let progress = Progress::new().with_poll_interval(Duration::ZERO);
        assert_eq!(progress.poll_interval(), MIN_POLL_INTERVAL);
    }
}
