// src/output/mod.rs

//! Output multiplexing.
//!
//! The runner never prints directly. Everything user-visible goes through a
//! caller-supplied [`MultiWriter`], which hands out one byte sink per stream
//! id. This module provides:
//!
//! - [`writer`]: the per-stream line-buffered, JSON-prettifying wrapper the
//!   runner applies to every stream.
//! - [`multiwriter`]: the `MultiWriter` trait and the caching wrapper.
//! - [`printer`]: an interleaved stdout sink, used by the CLI.
//! - [`memory`]: an in-memory sink for tests and embedders.

pub mod memory;
pub mod multiwriter;
pub mod printer;
pub mod writer;

pub use memory::MemoryWriter;
pub use multiwriter::MultiWriter;
pub use printer::Printer;
pub use writer::{OutputWriter, TaskWriter};

pub(crate) use multiwriter::LineWriters;
