// src/watch/mod.rs

//! File watching.
//!
//! Turns filesystem changes under a path-or-glob expression into debounced,
//! batched events. This module knows nothing about tasks or the dependency
//! graph; the runner maps event batches back to the tasks that watch the
//! path.

pub mod watcher;

pub use watcher::{watch, EventInfo, WatchHandle, DEBOUNCE_WINDOW};
