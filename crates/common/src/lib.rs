//! Shared domain types, the `Clock` abstraction, timeouts and the
//! `impl_context!` error helper used across the rgbot crates.

pub mod clock;
pub mod error;
pub mod timeout;
pub mod types;

pub use {
    clock::{Clock, SystemClock},
    error::FromMessage,
    timeout::{TimedOut, run_with_timeout},
};
