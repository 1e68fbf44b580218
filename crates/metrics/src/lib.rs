//! Metric names for the rgbot pipeline.
//!
//! Library crates record through the `metrics` facade behind their optional
//! `metrics` feature; nothing is exported until the host process installs a
//! recorder.
//!
//! ```rust,ignore
//! use rgbot_metrics::{counter, debounce, labels};
//!
//! counter!(debounce::FLUSHES_TOTAL, labels::CHANNEL => "discord").increment(1);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
