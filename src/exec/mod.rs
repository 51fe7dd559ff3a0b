// src/exec/mod.rs

//! Process execution.
//!
//! - [`script`] runs one shell script in its own process group with a
//!   SIGINT-then-SIGKILL cancellation ladder.
//! - [`script_task`] adapts a [`Script`] into a [`Task`](crate::library::Task).
//! - [`executor`] wraps any cancelable operation into a handle with
//!   single-shot execute / wait / cancel semantics; the runner supervises
//!   every task through one of these.

pub mod executor;
pub mod script;
pub mod script_task;

pub use executor::Executor;
pub use script::{Script, ScriptExecution, KILL_GRACE};
pub use script_task::ScriptTask;
