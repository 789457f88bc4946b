//! Inline computation on the caller's runtime.
//!
//! Used when no worker thread is available and to recompute requests the
//! worker failed on. The calculator runs only after yielding once, so a
//! burst of ready tasks (key events, redraws) gets scheduled first.

use super::{BackendKind, ComputationRequest, ExecutionBackend};
use crate::stats::{self, TextStats};
use async_trait::async_trait;
use tracing::debug;

/// Backend that computes on the current task after a yield point.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackBackend;

impl FallbackBackend {
    pub fn new() -> Self {
        Self
    }

    /// Yield to the scheduler, then compute.
    pub async fn compute(&self, request: &ComputationRequest) -> TextStats {
        tokio::task::yield_now().await;

        let start = std::time::Instant::now();
        let result = stats::compute(&request.text, request.words_per_minute);
        debug!(
            "Computed request {} inline: {} words in {}us",
            request.id,
            result.words,
            start.elapsed().as_micros()
        );
        result
    }
}

#[async_trait]
impl ExecutionBackend for FallbackBackend {
    async fn run(&self, request: ComputationRequest) -> Option<TextStats> {
        Some(self.compute(&request).await)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fallback_matches_calculator() {
        let backend = FallbackBackend::new();
        let text = "Hello world. 你好！";
        let request = ComputationRequest::new(1, text, 200);

        assert_eq!(backend.run(request).await, Some(stats::compute(text, 200)));
        assert_eq!(backend.kind(), BackendKind::Fallback);
    }

    #[tokio::test]
    async fn test_fallback_uses_request_reading_speed() {
        let backend = FallbackBackend::new();
        let text = "word ".repeat(300);

        let slow = backend.compute(&ComputationRequest::new(1, text.as_str(), 100)).await;
        let fast = backend.compute(&ComputationRequest::new(2, text.as_str(), 300)).await;
        assert_eq!(slow.reading_time, 3);
        assert_eq!(fast.reading_time, 1);
    }

    #[tokio::test]
    async fn test_fallback_shutdown_is_noop() {
        let backend = FallbackBackend::new();
        backend.shutdown();
        let stats = backend.run(ComputationRequest::new(1, "still works", 200)).await;
        assert_eq!(stats.map(|s| s.words), Some(2));
    }
}
