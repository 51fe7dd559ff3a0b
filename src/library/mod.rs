// src/library/mod.rs

//! The task library: an immutable, ordered collection of tasks and the pure
//! queries the runner needs over it.
//!
//! - [`task`] defines the [`Task`] trait and its orchestration metadata.
//! - [`library`] holds the collection itself: lookup, subtree closure, and
//!   the by-watch / by-dependency / by-trigger match scans.
//! - [`func_task`] adapts an async function into a [`Task`].
//! - [`validate`] checks a library's invariants at load time.

pub mod func_task;
#[allow(clippy::module_inception)]
pub mod library;
pub mod task;
pub mod validate;

pub use func_task::FuncTask;
pub use library::Library;
pub use task::{Task, TaskMetadata, TaskType};
pub use validate::validate;
