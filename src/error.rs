// src/error.rs

//! Error handling for the crate's I/O and lifecycle boundaries.
//!
//! The audio thread itself never returns a `Result`: numeric pathology is
//! clamped in place (see `limiter.rs`, `engine/filter.rs`) and resource
//! failures (a bad WAV, a missing device) are reported here and handled by
//! falling back to the prior state, not by propagating a panic into the
//! callback.

pub use anyhow::{anyhow, Context, Result};

/// Initializes the `env_logger` backend. Call once from a binary's `main`.
/// Library consumers that already initialize their own logger should skip
/// this and just use the `log` facade directly.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
