// src/taskfile/mod.rs

//! Task-file loading.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a root `tasks.toml` plus transitively referenced subdirectory
//!   task files, namespacing their ids (`loader.rs`).
//!
//! Semantic validation of the loaded set lives in
//! [`crate::library::validate`], which the loader invokes before handing a
//! library out.

pub mod loader;
pub mod model;

pub use loader::{load, TASKFILE_NAME};
pub use model::{TaskRecord, TaskfileDoc};
