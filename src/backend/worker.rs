//! Background stats worker.
//!
//! Runs in a dedicated thread so measuring a large document never blocks the
//! async runtime. Receives jobs from a channel, runs the calculator, and
//! replies on a per-job oneshot channel.
//!
//! Jobs that are no longer wanted are skipped without computing: either the
//! caller stopped waiting (reply channel closed), or a request with a higher
//! id was posted while the job sat in the queue.
//!
//! A panic inside the calculator is caught and reported as an error reply;
//! the worker keeps serving later jobs. The process panic hook still runs
//! for a caught panic, so its message reaches stderr unless the host
//! installs a quieter hook.

use super::{
    BackendError, BackendKind, ComputationRequest, ExecutionBackend, FallbackBackend, RequestId,
};
use crate::stats::{self, TextStats};
use async_trait::async_trait;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Calculator signature run by the worker.
pub type ComputeFn = fn(&str, u32) -> TextStats;

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    /// Stats for the request
    Computed(TextStats),
    /// The calculator panicked; carries the panic message
    Failed(String),
    /// A newer request was posted before this one was reached
    Superseded,
}

/// Jobs queued ahead of the worker before senders wait.
const JOB_QUEUE_DEPTH: usize = 16;

/// Name of the worker thread.
const THREAD_NAME: &str = "textpulse-worker";

/// A job for the stats worker.
#[derive(Debug)]
pub struct WorkerJob {
    /// Request to compute
    pub request: ComputationRequest,
    /// Where to send the outcome
    pub reply: oneshot::Sender<WorkerReply>,
}

/// Worker loop state, owned by the worker thread.
struct StatsWorker {
    compute: ComputeFn,
    job_rx: mpsc::Receiver<WorkerJob>,
    /// Highest request id posted so far, shared with the backend
    newest: Arc<AtomicU64>,
}

impl StatsWorker {
    fn new(compute: ComputeFn, job_rx: mpsc::Receiver<WorkerJob>, newest: Arc<AtomicU64>) -> Self {
        Self {
            compute,
            job_rx,
            newest,
        }
    }

    /// Run the worker loop (blocking) until every sender is gone.
    fn run(mut self) {
        info!("Stats worker started");

        while let Some(job) = self.job_rx.blocking_recv() {
            self.process_job(job);
        }

        info!("Stats worker stopped");
    }

    fn process_job(&self, job: WorkerJob) {
        let WorkerJob { request, reply } = job;

        // The engine stopped waiting for this one (disposed or abandoned)
        if reply.is_closed() {
            debug!("Skipping abandoned request {}", request.id);
            return;
        }

        let newest = self.newest.load(Ordering::SeqCst);
        if request.id < newest {
            debug!(
                "Skipping superseded request {} (newest is {})",
                request.id, newest
            );
            let _ = reply.send(WorkerReply::Superseded);
            return;
        }

        let start = std::time::Instant::now();
        let compute = self.compute;
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
            compute(&request.text, request.words_per_minute)
        })) {
            Ok(result) => {
                debug!(
                    "Worker computed request {}: {} words in {}us",
                    request.id,
                    result.words,
                    start.elapsed().as_micros()
                );
                WorkerReply::Computed(result)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Worker failed on request {}: {}", request.id, message);
                WorkerReply::Failed(message)
            }
        };

        if reply.send(outcome).is_err() {
            debug!("Reply channel for request {} closed", request.id);
        }
    }
}

/// Extract a readable message from a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "calculator panicked".to_string()
    }
}

/// Backend that posts requests to a dedicated worker thread.
///
/// Requests the worker cannot answer are recomputed on the fallback path.
/// A request is skipped (and [`ExecutionBackend::run`] yields `None`) when a
/// higher request id was posted before the worker reached it, so one
/// backend should serve the ids of a single engine.
pub struct WorkerBackend {
    /// Job channel; `None` once shut down
    job_tx: Mutex<Option<mpsc::Sender<WorkerJob>>>,
    /// Worker thread handle
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    /// Highest request id posted so far
    newest: Arc<AtomicU64>,
    fallback: FallbackBackend,
}

impl WorkerBackend {
    /// Spawn a worker running the standard calculator.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned (rare, usually resource exhaustion).
    pub fn spawn() -> Result<Self, BackendError> {
        Self::spawn_with(stats::compute)
    }

    /// Spawn a worker running `compute` instead of the standard calculator.
    ///
    /// Fallback recomputation always uses the standard calculator.
    pub fn spawn_with(compute: ComputeFn) -> Result<Self, BackendError> {
        let (job_tx, job_rx) = mpsc::channel(JOB_QUEUE_DEPTH);
        let newest = Arc::new(AtomicU64::new(0));
        let worker_newest = Arc::clone(&newest);

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || StatsWorker::new(compute, job_rx, worker_newest).run())
            .map_err(BackendError::Spawn)?;

        Ok(Self {
            job_tx: Mutex::new(Some(job_tx)),
            thread: Mutex::new(Some(thread)),
            newest,
            fallback: FallbackBackend::new(),
        })
    }

    /// Check whether the worker thread is still alive.
    pub fn is_running(&self) -> bool {
        lock(&self.thread)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Highest request id posted to this backend.
    pub fn newest_request(&self) -> RequestId {
        self.newest.load(Ordering::SeqCst)
    }

    /// Post a request and wait for the worker's reply.
    pub async fn post(&self, request: ComputationRequest) -> Result<TextStats, BackendError> {
        let sender = lock(&self.job_tx)
            .clone()
            .ok_or(BackendError::ChannelClosed)?;

        let id = request.id;
        self.newest.fetch_max(id, Ordering::SeqCst);

        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(WorkerJob {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| BackendError::ChannelClosed)?;

        match reply_rx.await {
            Ok(WorkerReply::Computed(stats)) => Ok(stats),
            Ok(WorkerReply::Failed(message)) => Err(BackendError::Worker(message)),
            Ok(WorkerReply::Superseded) => Err(BackendError::Superseded(id)),
            Err(_) => Err(BackendError::ChannelClosed),
        }
    }
}

#[async_trait]
impl ExecutionBackend for WorkerBackend {
    async fn run(&self, request: ComputationRequest) -> Option<TextStats> {
        match self.post(request.clone()).await {
            Ok(stats) => Some(stats),
            Err(BackendError::Superseded(_)) => None,
            Err(e) => {
                warn!(
                    "Worker could not compute request {} ({}), recomputing inline",
                    request.id, e
                );
                Some(self.fallback.compute(&request).await)
            }
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Worker
    }

    fn shutdown(&self) {
        // Dropping the last sender ends the worker loop after its current job
        if lock(&self.job_tx).take().is_some() {
            info!("Stopping stats worker");
        }
        // Detach; the thread exits on its own once the channel is closed
        lock(&self.thread).take();
    }
}

impl Drop for WorkerBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Worker backend mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn exploding(_text: &str, _words_per_minute: u32) -> TextStats {
        panic!("calculator exploded")
    }

    fn exploding_on_secret(text: &str, words_per_minute: u32) -> TextStats {
        if text.contains("secret") {
            panic!("refusing to count secrets");
        }
        stats::compute(text, words_per_minute)
    }

    #[tokio::test]
    async fn test_worker_computes_stats() {
        let backend = WorkerBackend::spawn().unwrap();
        let text = "The quick brown fox. 它跳了！";

        let result = backend.run(ComputationRequest::new(1, text, 200)).await;
        assert_eq!(result, Some(stats::compute(text, 200)));
        assert_eq!(backend.kind(), BackendKind::Worker);
    }

    #[tokio::test]
    async fn test_post_reports_error_payload() {
        let backend = WorkerBackend::spawn_with(exploding).unwrap();

        let err = backend
            .post(ComputationRequest::new(1, "hello world", 200))
            .await
            .unwrap_err();
        match err {
            BackendError::Worker(message) => assert!(message.contains("calculator exploded")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_error_payload_recomputed_inline() {
        let backend = WorkerBackend::spawn_with(exploding).unwrap();

        let result = backend
            .run(ComputationRequest::new(1, "hello world", 200))
            .await;
        assert_eq!(result.map(|s| s.words), Some(2));
    }

    #[tokio::test]
    async fn test_worker_survives_failed_request() {
        let backend = WorkerBackend::spawn_with(exploding_on_secret).unwrap();

        let failed = backend
            .post(ComputationRequest::new(1, "a secret", 200))
            .await;
        assert!(matches!(failed, Err(BackendError::Worker(_))));

        // Same worker still serves the next request
        let ok = backend
            .post(ComputationRequest::new(2, "plain words here", 200))
            .await
            .unwrap();
        assert_eq!(ok.words, 3);
        assert!(backend.is_running());
    }

    #[tokio::test]
    async fn test_run_after_shutdown_falls_back() {
        let backend = WorkerBackend::spawn().unwrap();
        backend.shutdown();

        let err = backend
            .post(ComputationRequest::new(1, "hello world", 200))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ChannelClosed));

        let result = backend
            .run(ComputationRequest::new(2, "hello world", 200))
            .await;
        assert_eq!(result.map(|s| s.words), Some(2));
    }

    #[test]
    fn test_worker_thread_exits_when_channel_closes() {
        let (job_tx, job_rx) = mpsc::channel::<WorkerJob>(1);
        let newest = Arc::new(AtomicU64::new(0));
        let handle =
            std::thread::spawn(move || StatsWorker::new(stats::compute, job_rx, newest).run());

        drop(job_tx);
        handle.join().expect("Worker thread panicked");
    }

    #[tokio::test]
    async fn test_shutdown_stops_thread() {
        let backend = WorkerBackend::spawn().unwrap();
        assert!(backend.is_running());
        let thread = lock(&backend.thread).take().unwrap();

        backend.shutdown();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !thread.is_finished() {
            assert!(std::time::Instant::now() < deadline, "worker thread did not stop");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        thread.join().expect("Worker thread panicked");
    }

    // ===================
    // Skipped Job Tests
    // ===================

    static COUNTED_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting(text: &str, words_per_minute: u32) -> TextStats {
        COUNTED_CALLS.fetch_add(1, Ordering::SeqCst);
        stats::compute(text, words_per_minute)
    }

    static QUEUED_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_queued(text: &str, words_per_minute: u32) -> TextStats {
        QUEUED_CALLS.fetch_add(1, Ordering::SeqCst);
        stats::compute(text, words_per_minute)
    }

    fn idle_worker(compute: ComputeFn, newest: RequestId) -> StatsWorker {
        let (_job_tx, job_rx) = mpsc::channel(1);
        StatsWorker::new(compute, job_rx, Arc::new(AtomicU64::new(newest)))
    }

    #[test]
    fn test_abandoned_job_is_not_computed() {
        let (reply_tx, reply_rx) = oneshot::channel();
        drop(reply_rx);

        let worker = idle_worker(counting, 1);
        worker.process_job(WorkerJob {
            request: ComputationRequest::new(1, "ignored", 200),
            reply: reply_tx,
        });

        assert_eq!(COUNTED_CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_superseded_job_is_not_computed() {
        let worker = idle_worker(counting_queued, 5);

        let (stale_tx, mut stale_rx) = oneshot::channel();
        worker.process_job(WorkerJob {
            request: ComputationRequest::new(4, "older text", 200),
            reply: stale_tx,
        });
        assert_eq!(stale_rx.try_recv().unwrap(), WorkerReply::Superseded);
        assert_eq!(QUEUED_CALLS.load(Ordering::SeqCst), 0);

        let (current_tx, mut current_rx) = oneshot::channel();
        worker.process_job(WorkerJob {
            request: ComputationRequest::new(5, "newest text", 200),
            reply: current_tx,
        });
        assert_eq!(
            current_rx.try_recv().unwrap(),
            WorkerReply::Computed(stats::compute("newest text", 200))
        );
        assert_eq!(QUEUED_CALLS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_superseded_request_yields_none() {
        let backend = WorkerBackend::spawn().unwrap();
        backend.newest.store(9, Ordering::SeqCst);

        let result = backend.run(ComputationRequest::new(3, "old text", 200)).await;
        assert_eq!(result, None);

        let result = backend.run(ComputationRequest::new(10, "new text", 200)).await;
        assert_eq!(result.map(|s| s.words), Some(2));
        assert_eq!(backend.newest_request(), 10);
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn std::any::Any + Send> = Box::new("borrowed");
        let other: Box<dyn std::any::Any + Send> = Box::new(42u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "calculator panicked");
    }
}
