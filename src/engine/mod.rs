//! Incremental stats engine.
//!
//! The engine owns one piece of changing text and keeps a [`Snapshot`] of
//! its statistics up to date:
//! 1. [`Engine::feed`] passes text through a debounce gate
//! 2. When input goes quiet, a new request id is minted and marked current
//! 3. The execution backend computes stats (worker thread, or inline)
//! 4. A result is accepted only if its request is still current
//!
//! Results can complete out of order (an inline computation for newer text
//! racing a worker computation for older text). Request ids make the late
//! arrival a no-op, so the snapshot always reflects the newest text that has
//! finished computing.

mod subscription;

pub use subscription::Subscription;

use crate::backend::{
    select_backend, BackendKind, ComputationRequest, ExecutionBackend, RequestId, WorkerBackend,
};
use crate::config::{ConfigError, EngineConfig};
use crate::debounce::Debouncer;
use crate::stats::{self, TextStats};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine must be created inside a tokio runtime")]
    NoRuntime,

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// State delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Stats of the newest text that finished computing
    pub stats: TextStats,
    /// True while a dispatched request has not been accepted yet
    pub is_calculating: bool,
}

type Callback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Mutable engine state, guarded by one mutex.
struct EngineState {
    snapshot: Snapshot,
    /// Id of the request whose result may still be accepted
    current: RequestId,
    /// Last id handed out
    last_issued: RequestId,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback>,
}

/// Shared core referenced by the debounce sink, dispatch tasks and the
/// delivery task.
struct Inner {
    config: EngineConfig,
    backend: Arc<dyn ExecutionBackend>,
    state: Mutex<EngineState>,
    subscribers: Mutex<Subscribers>,
    /// Written only while `state` is locked
    disposed: AtomicBool,
    /// State changes, in mutation order, for the delivery task
    events_tx: mpsc::UnboundedSender<Snapshot>,
    /// Flipped to true on dispose; in-flight dispatches abandon their work
    shutdown_tx: watch::Sender<bool>,
    runtime: Handle,
}

/// Debounced, cancellable text statistics.
///
/// Must be created inside a tokio runtime; [`Engine::feed`] and the other
/// methods may then be called from any thread. Dropping the engine disposes
/// it.
pub struct Engine {
    inner: Arc<Inner>,
    debouncer: Debouncer<String>,
}

impl Engine {
    /// Create an engine, starting a worker thread if the config asks for one.
    ///
    /// A worker that fails to start is logged and the engine computes inline
    /// for the rest of its life.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let backend = select_backend(config.use_worker, WorkerBackend::spawn);
        Ok(Self::build(config, backend, runtime))
    }

    /// Create an engine on a caller-supplied backend.
    ///
    /// `config.use_worker` is ignored.
    pub fn with_backend(
        config: EngineConfig,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        Ok(Self::build(config, backend, runtime))
    }

    fn build(config: EngineConfig, backend: Arc<dyn ExecutionBackend>, runtime: Handle) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        let initial = Snapshot {
            stats: stats::compute("", config.words_per_minute),
            is_calculating: false,
        };

        let inner = Arc::new(Inner {
            config: config.clone(),
            backend,
            state: Mutex::new(EngineState {
                snapshot: initial,
                current: 0,
                last_issued: 0,
            }),
            subscribers: Mutex::new(Subscribers::default()),
            disposed: AtomicBool::new(false),
            events_tx,
            shutdown_tx,
            runtime: runtime.clone(),
        });

        runtime.spawn(deliver(Arc::downgrade(&inner), events_rx));

        let sink_target = Arc::downgrade(&inner);
        let debouncer = Debouncer::with_handle(config.debounce(), runtime, move |text: String| {
            if let Some(inner) = sink_target.upgrade() {
                inner.dispatch(text);
            }
        });

        info!(
            "Stats engine ready ({} backend, debounce {} ms, {} wpm)",
            inner.backend.kind(),
            config.debounce_ms,
            config.words_per_minute
        );

        Self { inner, debouncer }
    }

    /// Accept new text. Never blocks; computation happens after the
    /// debounce interval passes without further input.
    pub fn feed(&self, text: impl Into<String>) {
        if self.inner.is_disposed() {
            debug!("Ignoring input fed to a disposed engine");
            return;
        }
        self.debouncer.call(text.into());
    }

    /// Dispatch pending input now instead of waiting out the debounce
    /// interval. `is_calculating` is set before this returns if anything
    /// was pending.
    pub fn flush(&self) {
        if self.inner.is_disposed() {
            return;
        }
        self.debouncer.flush();
    }

    /// Register a callback for state changes.
    ///
    /// Callbacks run on one delivery task, in the order the state changed.
    /// They may call back into the engine. The returned [`Subscription`]
    /// unsubscribes when dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let id = {
            let mut subscribers = lock(&self.inner.subscribers);
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            subscribers.callbacks.insert(id, Arc::new(callback));
            id
        };
        Subscription::new(id, Arc::downgrade(&self.inner))
    }

    /// Current accepted state.
    pub fn snapshot(&self) -> Snapshot {
        lock(&self.inner.state).snapshot
    }

    /// Execution path this engine settled on.
    pub fn backend_kind(&self) -> BackendKind {
        self.inner.backend.kind()
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Check whether [`Engine::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Tear the engine down.
    ///
    /// Cancels pending input, abandons in-flight computations, stops the
    /// worker and drops every subscriber. No callback runs afterwards.
    /// Calling it again is a no-op.
    pub fn dispose(&self) {
        self.debouncer.cancel();

        {
            let _state = lock(&self.inner.state);
            if self.inner.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
        }

        self.inner.shutdown_tx.send_replace(true);
        self.inner.backend.shutdown();
        lock(&self.inner.subscribers).callbacks.clear();

        info!("Stats engine disposed");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Mint a request for `text` and hand it to the backend.
    fn dispatch(self: &Arc<Self>, text: String) {
        let (request, mut shutdown_rx) = {
            let mut state = lock(&self.state);
            if self.is_disposed() {
                return;
            }

            state.last_issued += 1;
            state.current = state.last_issued;
            state.snapshot.is_calculating = true;
            self.publish(state.snapshot);

            // Subscribed under the lock so a concurrent dispose is observed
            let shutdown_rx = self.shutdown_tx.subscribe();
            (
                ComputationRequest::new(state.current, text, self.config.words_per_minute),
                shutdown_rx,
            )
        };

        debug!(
            "Dispatching request {} ({} bytes) to {} backend",
            request.id,
            request.text.len(),
            self.backend.kind()
        );

        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let id = request.id;
            tokio::select! {
                result = inner.backend.run(request) => match result {
                    Some(stats) => inner.accept(id, stats),
                    None => debug!("Request {} superseded before it was computed", id),
                },
                _ = shutdown_rx.changed() => {
                    debug!("Request {} abandoned on dispose", id);
                }
            }
        });
    }

    /// Apply a finished computation if its request is still current.
    fn accept(&self, id: RequestId, result: TextStats) {
        let mut state = lock(&self.state);

        if self.is_disposed() {
            debug!("Dropping result for request {}: engine disposed", id);
            return;
        }

        if id != state.current {
            debug!(
                "Dropping stale result for request {} (current is {})",
                id, state.current
            );
            return;
        }

        state.snapshot = Snapshot {
            stats: result,
            is_calculating: false,
        };
        self.publish(state.snapshot);
        debug!("Accepted result for request {}: {} words", id, result.words);
    }

    /// Queue a state change for subscribers. Call with `state` locked.
    fn publish(&self, snapshot: Snapshot) {
        if self.events_tx.send(snapshot).is_err() {
            warn!("Snapshot delivery task has stopped");
        }
    }

    /// Invoke every subscriber with `snapshot`.
    fn notify(&self, snapshot: &Snapshot) {
        let callbacks: Vec<Callback> = lock(&self.subscribers)
            .callbacks
            .values()
            .cloned()
            .collect();

        for callback in callbacks {
            if self.is_disposed() {
                return;
            }
            callback(snapshot);
        }
    }

    fn unsubscribe(&self, id: u64) {
        lock(&self.subscribers).callbacks.remove(&id);
    }
}

/// Delivery loop: forwards queued snapshots to subscribers in order.
async fn deliver(inner: Weak<Inner>, mut events_rx: mpsc::UnboundedReceiver<Snapshot>) {
    while let Some(snapshot) = events_rx.recv().await {
        let Some(core) = inner.upgrade() else {
            break;
        };
        if core.is_disposed() {
            break;
        }
        core.notify(&snapshot);
    }
    debug!("Snapshot delivery stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Engine mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}
