// src/output/multiwriter.rs

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::output::writer::{OutputWriter, TaskWriter};

/// The interface the runner uses to display output. Each output stream is
/// named by a task id (or one of the runner's internal stream ids), and
/// `writer` returns a byte sink for that stream.
///
/// Implementations must be safe for concurrent use: every running task
/// writes to its own stream from its own thread of execution.
pub trait MultiWriter: Send + Sync {
    fn writer(&self, id: &str) -> Box<dyn Write + Send>;
}

/// Wraps a caller-supplied [`MultiWriter`] so that every stream goes through
/// one shared line-buffered, JSON-prettifying [`OutputWriter`]. Writers are
/// cached per id: the line buffer for a stream must persist across the many
/// places that write to it.
pub(crate) struct LineWriters {
    base: Box<dyn MultiWriter>,
    writers: Mutex<HashMap<String, TaskWriter>>,
}

impl LineWriters {
    pub fn new(base: Box<dyn MultiWriter>) -> Self {
        Self {
            base,
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// The shared handle for the given stream id.
    pub fn writer(&self, id: &str) -> TaskWriter {
        let mut writers = self.writers.lock().expect("line writers lock poisoned");
        writers
            .entry(id.to_string())
            .or_insert_with(|| {
                TaskWriter::new(Arc::new(OutputWriter::new(self.base.writer(id))))
            })
            .clone()
    }

    /// Write a single log line to the given stream. Errors are ignored: a
    /// sink that stops accepting output must not take the run down with it.
    pub fn line(&self, id: &str, msg: impl AsRef<str>) {
        let mut w = self.writer(id);
        let _ = writeln!(w, "{}", msg.as_ref());
    }
}
