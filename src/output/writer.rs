// src/output/writer.rs

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Per-stream wrapper over a downstream byte sink.
///
/// Bytes accumulate until a newline, then the whole line is flushed
/// downstream in one write. If a flushed line parses as JSON, it is
/// reformatted with 2-space indentation before being emitted, so tools that
/// log single-line JSON stay readable.
pub struct OutputWriter {
    inner: Mutex<Inner>,
}

struct Inner {
    buf: Vec<u8>,
    downstream: Box<dyn Write + Send>,
}

impl OutputWriter {
    pub fn new(downstream: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: Vec::new(),
                downstream,
            }),
        }
    }

    fn write_bytes(&self, bs: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().expect("output writer lock poisoned");
        for &b in bs {
            inner.buf.push(b);
            if b == b'\n' {
                inner.flush_line()?;
            }
        }
        Ok(bs.len())
    }
}

impl Inner {
    fn flush_line(&mut self) -> io::Result<()> {
        let line = std::mem::take(&mut self.buf);
        let rendered = prettify(&line);
        self.downstream.write_all(&rendered)?;
        self.downstream.flush()
    }
}

/// Reformat a line of JSON with 2-space indentation. Lines that don't parse
/// are passed through untouched.
fn prettify(line: &[u8]) -> Vec<u8> {
    let trimmed = trim_newline(line);
    if trimmed.is_empty() {
        return line.to_vec();
    }
    match serde_json::from_slice::<serde_json::Value>(trimmed) {
        Ok(value) => {
            let mut pretty = serde_json::to_string_pretty(&value)
                .unwrap_or_else(|_| String::from_utf8_lossy(trimmed).into_owned())
                .into_bytes();
            pretty.push(b'\n');
            pretty
        }
        Err(_) => line.to_vec(),
    }
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// A clonable handle to a shared [`OutputWriter`]. This is the byte sink
/// handed to tasks: a script's stdout and stderr are two clones of the same
/// handle, and concurrent writers interleave at line granularity.
#[derive(Clone)]
pub struct TaskWriter(Arc<OutputWriter>);

impl TaskWriter {
    pub fn new(writer: Arc<OutputWriter>) -> Self {
        Self(writer)
    }
}

impl Write for TaskWriter {
    fn write(&mut self, bs: &[u8]) -> io::Result<usize> {
        self.0.write_bytes(bs)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
