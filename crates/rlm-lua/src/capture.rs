//! Scoped output capture.
//!
//! Evaluated code writes through an [`OutputSink`] instead of the process
//! streams. While a [`CaptureGuard`] is alive, writes land in its buffers;
//! dropping or finishing the guard restores whatever was active before, on
//! every exit path. Guards nest.
//!
//! With no guard active, writes fall through to the process stderr.
//! Stdout is never used: it carries the protocol.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// Target stream of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Regular output (`print`, `io.write`).
    Stdout,
    /// Diagnostic output (`io.stderr:write`, failure descriptions).
    Stderr,
}

/// Text captured during one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Captured regular output.
    pub stdout: String,
    /// Captured diagnostic output.
    pub stderr: String,
}

impl CapturedOutput {
    fn push(&mut self, stream: Stream, text: &str) {
        match stream {
            Stream::Stdout => self.stdout.push_str(text),
            Stream::Stderr => self.stderr.push_str(text),
        }
    }
}

/// Shared write handle handed to the Lua output functions.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    active: Rc<RefCell<Option<CapturedOutput>>>,
}

impl OutputSink {
    /// Creates a sink with no capture active.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `text` to `stream`.
    pub fn write(&self, stream: Stream, text: &str) {
        let mut active = self.active.borrow_mut();
        match active.as_mut() {
            Some(buffer) => buffer.push(stream, text),
            None => {
                tracing::trace!(?stream, len = text.len(), "uncaptured sandbox output");
                let _ = std::io::stderr().write_all(text.as_bytes());
            }
        }
    }

    /// Returns `true` while a capture is active.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.active.borrow().is_some()
    }

    /// Starts a capture scope.
    ///
    /// The previous scope (if any) is suspended until the guard ends.
    #[must_use = "capture ends when the guard is dropped"]
    pub fn capture(&self) -> CaptureGuard {
        let previous = self.active.replace(Some(CapturedOutput::default()));
        CaptureGuard {
            sink: self.clone(),
            previous,
            restored: false,
        }
    }
}

/// Active capture scope. Restores the previous scope on drop.
#[derive(Debug)]
pub struct CaptureGuard {
    sink: OutputSink,
    previous: Option<CapturedOutput>,
    restored: bool,
}

impl CaptureGuard {
    /// Ends the scope and returns what it captured.
    #[must_use]
    pub fn finish(mut self) -> CapturedOutput {
        self.restore().unwrap_or_default()
    }

    fn restore(&mut self) -> Option<CapturedOutput> {
        if self.restored {
            return None;
        }
        self.restored = true;
        self.sink.active.replace(self.previous.take())
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
