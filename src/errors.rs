// src/errors.rs

//! Crate-wide error types.
//!
//! Configuration problems (bad task files, invalid graphs) travel as plain
//! `anyhow` errors from the loader. Everything that can happen to a running
//! task is a [`TaskError`], which is `Clone` so a single exit result can be
//! fanned out to every waiter on an executor.

pub use anyhow::{Error, Result};

/// The result of running a task, or of the run itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task's process exited with a non-zero status code.
    #[error("exit {0}")]
    Exit(i32),

    /// The run (or a single task execution) was canceled.
    #[error("run canceled")]
    Canceled,

    /// Anything else: spawn failures, wait errors, signalling errors.
    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::Failed(msg.into())
    }

    /// Fold extra failures (e.g. signalling errors encountered during the
    /// kill ladder) into an existing error.
    pub fn join(self, extra: &[String]) -> Self {
        if extra.is_empty() {
            return self;
        }
        TaskError::Failed(format!("{}; {}", self, extra.join("; ")))
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Failed(format!("{err:#}"))
    }
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::Failed(err.to_string())
    }
}
