// src/runner/mod.rs

//! The runner: the event loop that owns all run-scoped state.
//!
//! Everything that can change a run — activation, deactivation, filesystem
//! events, task readiness, task exits — arrives as a message on one input
//! channel and is handled sequentially. Watchers, executor supervisors, and
//! retry timers are producers; the loop is the only consumer, so no handler
//! ever observes a half-applied transition.

#[allow(clippy::module_inception)]
pub mod runner;

pub use runner::{
    Runner, RunnerMode, Status, TaskStatus, INTERLEAVED_STREAM, RETRY_DELAY, WATCH_STREAM,
};
