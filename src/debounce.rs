//! Trailing-edge debounce gate.
//!
//! Wraps a sink so that a burst of calls results in a single sink invocation,
//! `delay` after the last call, carrying the latest argument. Intermediate
//! arguments are never delivered.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Timer and argument owned by one debouncer.
struct DebounceState<T> {
    /// Timer task waiting to fire, if any
    pending: Option<JoinHandle<()>>,
    /// Argument of the most recent call
    latest: Option<T>,
    /// Bumped on every call and cancel; a timer only fires if it still matches
    generation: u64,
}

/// Debounces calls to a sink on a tokio runtime.
///
/// Dropping the debouncer cancels any pending invocation.
pub struct Debouncer<T> {
    delay: Duration,
    sink: Sink<T>,
    state: Arc<Mutex<DebounceState<T>>>,
    runtime: Handle,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer on the current tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime. Use [`Debouncer::with_handle`]
    /// when constructing from a plain thread.
    pub fn new<F>(delay: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::with_handle(delay, Handle::current(), sink)
    }

    /// Create a debouncer whose timers run on `runtime`.
    pub fn with_handle<F>(delay: Duration, runtime: Handle, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            delay,
            sink: Arc::new(sink),
            state: Arc::new(Mutex::new(DebounceState {
                pending: None,
                latest: None,
                generation: 0,
            })),
            runtime,
        }
    }

    /// Schedule the sink with `arg`, superseding any pending call.
    pub fn call(&self, arg: T) {
        let mut state = lock_state(&self.state);

        if let Some(previous) = state.pending.take() {
            previous.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        state.latest = Some(arg);

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let delay = self.delay;

        state.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let arg = {
                let mut state = lock_state(&shared);
                // A newer call or a cancel got here first
                if state.generation != generation {
                    return;
                }
                state.pending = None;
                state.latest.take()
            };

            if let Some(arg) = arg {
                trace!("Debounce timer fired (generation {})", generation);
                sink(arg);
            }
        }));
    }

    /// Discard any pending invocation without firing it.
    pub fn cancel(&self) {
        let mut state = lock_state(&self.state);
        if let Some(pending) = state.pending.take() {
            pending.abort();
            trace!("Debounced call cancelled");
        }
        state.latest = None;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Fire a pending invocation now, on the calling thread.
    ///
    /// Does nothing when no call is pending.
    pub fn flush(&self) {
        let arg = {
            let mut state = lock_state(&self.state);
            let Some(pending) = state.pending.take() else {
                return;
            };
            pending.abort();
            state.generation = state.generation.wrapping_add(1);
            state.latest.take()
        };

        if let Some(arg) = arg {
            trace!("Debounced call flushed");
            (self.sink)(arg);
        }
    }

    /// Check whether a call is waiting to fire.
    pub fn is_pending(&self) -> bool {
        lock_state(&self.state).pending.is_some()
    }

    /// The quiet period this debouncer waits for.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let mut state = lock_state(&self.state);
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.latest = None;
        state.generation = state.generation.wrapping_add(1);
    }
}

fn lock_state<T>(state: &Mutex<DebounceState<T>>) -> MutexGuard<'_, DebounceState<T>> {
    state.lock().unwrap_or_else(|poisoned| {
        warn!("Debounce state mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}
