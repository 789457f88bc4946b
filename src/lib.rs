//! textpulse: incremental text statistics.
//!
//! Feed changing text into an [`Engine`] and receive up-to-date word,
//! sentence, paragraph and reading-time counts without blocking the caller
//! and without recomputing on every keystroke.
//!
//! The calculator itself ([`stats::compute`]) is a pure function and can be
//! used directly.

pub mod backend;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod stats;

// Re-export commonly used types for convenience
pub use config::{Config, EngineConfig};
pub use engine::{Engine, EngineError, Snapshot, Subscription};
pub use stats::{compute, TextStats};
