//! Execution backends for the stats calculator.
//!
//! A backend takes a [`ComputationRequest`] and eventually yields
//! [`TextStats`] for it. Two implementations exist:
//! - [`WorkerBackend`]: a dedicated thread, so large documents never stall
//!   the async runtime driving the UI
//! - [`FallbackBackend`]: inline computation after a yield point, used when
//!   the worker is disabled or could not be started
//!
//! Backends never fail from the caller's point of view. A worker that
//! errors on one request recomputes that request on the fallback path.
//! A backend may skip a request that a newer one has superseded before work
//! on it started; such a request yields `None`.

pub mod fallback;
pub mod worker;

pub use fallback::FallbackBackend;
pub use worker::WorkerBackend;

use crate::stats::TextStats;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Monotonically increasing identifier of a computation request.
pub type RequestId = u64;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Worker channel closed")]
    ChannelClosed,

    #[error("Worker reported an error: {0}")]
    Worker(String),

    #[error("Request {0} was superseded before the worker reached it")]
    Superseded(RequestId),
}

/// A snapshot of text waiting to be measured.
#[derive(Debug, Clone)]
pub struct ComputationRequest {
    /// Request id used for staleness checks
    pub id: RequestId,
    /// Text as it was when the debounce gate fired
    pub text: Arc<str>,
    /// Reading speed for the reading-time estimate
    pub words_per_minute: u32,
}

impl ComputationRequest {
    pub fn new(id: RequestId, text: impl Into<Arc<str>>, words_per_minute: u32) -> Self {
        Self {
            id,
            text: text.into(),
            words_per_minute,
        }
    }
}

/// Which execution path a backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Dedicated background thread
    Worker,
    /// Inline on the caller's runtime
    Fallback,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker => write!(f, "worker"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Strategy for running the stats calculator.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Compute stats for `request`, or `None` if it was superseded by a
    /// newer request before it was computed.
    async fn run(&self, request: ComputationRequest) -> Option<TextStats>;

    /// The execution path this backend takes.
    fn kind(&self) -> BackendKind;

    /// Release background resources. Later requests must still complete.
    fn shutdown(&self) {}
}

/// Pick the backend for a new engine.
///
/// With `use_worker` set, `spawn_worker` is tried once. A failure is logged
/// and the engine stays on the fallback path for its whole life.
pub fn select_backend<B, F>(use_worker: bool, spawn_worker: F) -> Arc<dyn ExecutionBackend>
where
    B: ExecutionBackend + 'static,
    F: FnOnce() -> Result<B, BackendError>,
{
    if !use_worker {
        info!("Stats worker disabled, computing inline");
        return Arc::new(FallbackBackend::new());
    }

    match spawn_worker() {
        Ok(worker) => Arc::new(worker),
        Err(e) => {
            warn!("Failed to start stats worker ({}), computing inline", e);
            Arc::new(FallbackBackend::new())
        }
    }
}
