// src/output/printer.rs

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::output::multiwriter::MultiWriter;

/// A [`MultiWriter`] that interleaves every stream onto stdout.
///
/// Each line is printed as a right-aligned stream-id column followed by the
/// line itself. The id is only shown when the stream changes, and stream
/// changes are separated by a blank line, so bursts of output from one task
/// read as a block:
///
/// ```text
///    build | compiling...
///          | done
///
///   server | listening on :8080
/// ```
pub struct Printer {
    inner: Arc<Mutex<PrinterState>>,
}

struct PrinterState {
    key_width: usize,
    last_id: Option<String>,
    stdout: Box<dyn Write + Send>,
}

impl Printer {
    /// `key_width` should accommodate the longest stream id that will be
    /// printed; see [`crate::library::Library::longest_id`].
    pub fn new(key_width: usize) -> Self {
        Self::with_output(key_width, Box::new(io::stdout()))
    }

    pub fn with_output(key_width: usize, stdout: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PrinterState {
                key_width,
                last_id: None,
                stdout,
            })),
        }
    }
}

impl MultiWriter for Printer {
    fn writer(&self, id: &str) -> Box<dyn Write + Send> {
        Box::new(PrinterStream {
            inner: Arc::clone(&self.inner),
            id: id.to_string(),
        })
    }
}

struct PrinterStream {
    inner: Arc<Mutex<PrinterState>>,
    id: String,
}

impl Write for PrinterStream {
    fn write(&mut self, bs: &[u8]) -> io::Result<usize> {
        let chunk = String::from_utf8_lossy(bs);
        let mut state = self.inner.lock().expect("printer lock poisoned");

        for line in chunk.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let key = if state.last_id.as_deref() == Some(self.id.as_str()) {
                String::new()
            } else {
                if state.last_id.is_some() {
                    writeln!(state.stdout)?;
                }
                state.last_id = Some(self.id.clone());
                self.id.clone()
            };
            let width = state.key_width;
            writeln!(state.stdout, "{key:>width$} | {line}")?;
        }
        state.stdout.flush()?;
        Ok(bs.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
