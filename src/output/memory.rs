// src/output/memory.rs

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::output::multiwriter::MultiWriter;

/// An in-memory [`MultiWriter`] that records everything written to it.
///
/// Every write is appended both to a per-stream transcript and to a combined
/// transcript where each chunk is prefixed with `[id] `. Because the runner
/// line-buffers all streams, each chunk is exactly one line, so the combined
/// transcript interleaves whole lines in arrival order.
///
/// This is the sink used by the integration tests, and a convenient starting
/// point for embedders bringing their own UI.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    inner: Arc<Mutex<Streams>>,
}

#[derive(Default)]
struct Streams {
    combined: String,
    by_id: HashMap<String, String>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The interleaved transcript of every stream, one `[id] line` per line.
    pub fn combined(&self) -> String {
        self.inner.lock().expect("memory writer lock poisoned").combined.clone()
    }

    /// The transcript of a single stream, or empty if nothing was written.
    pub fn stream(&self, id: &str) -> String {
        self.inner
            .lock()
            .expect("memory writer lock poisoned")
            .by_id
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

impl MultiWriter for MemoryWriter {
    fn writer(&self, id: &str) -> Box<dyn Write + Send> {
        Box::new(MemoryStream {
            inner: Arc::clone(&self.inner),
            id: id.to_string(),
        })
    }
}

struct MemoryStream {
    inner: Arc<Mutex<Streams>>,
    id: String,
}

impl Write for MemoryStream {
    fn write(&mut self, bs: &[u8]) -> io::Result<usize> {
        let chunk = String::from_utf8_lossy(bs);
        let mut streams = self.inner.lock().expect("memory writer lock poisoned");
        streams.combined.push_str(&format!("[{}] {}", self.id, chunk));
        streams
            .by_id
            .entry(self.id.clone())
            .or_default()
            .push_str(&chunk);
        Ok(bs.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
