//! Newline-delimited line transport.
//!
//! One [`LineTransport`] owns both protocol streams. The server loop and
//! the bridge client hold the same `Rc<LineTransport>`: while an `execute`
//! is in flight, the bridge client reads the host's reply from the same
//! inbound stream the loop reads requests from.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Transport I/O failures. Any of these ends the server loop.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading the inbound stream failed.
    #[error("failed to read inbound line: {0}")]
    Read(#[source] io::Error),

    /// Writing or flushing the outbound stream failed.
    #[error("failed to write outbound line: {0}")]
    Write(#[source] io::Error),
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Read(e) | TransportError::Write(e) => e,
        }
    }
}

/// Shared inbound reader and outbound writer.
pub struct LineTransport {
    reader: RefCell<Box<dyn BufRead>>,
    writer: RefCell<Box<dyn Write>>,
}

impl std::fmt::Debug for LineTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineTransport").finish_non_exhaustive()
    }
}

impl LineTransport {
    /// Wraps an inbound and an outbound stream.
    pub fn new(reader: impl BufRead + 'static, writer: impl Write + 'static) -> Self {
        Self {
            reader: RefCell::new(Box::new(reader)),
            writer: RefCell::new(Box::new(writer)),
        }
    }

    /// Transport over the process stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }

    /// Reads the next non-blank line without its terminator.
    ///
    /// Returns `Ok(None)` at end of stream. Invalid UTF-8 is replaced
    /// rather than rejected, so the line still reaches the decoder.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Read`] if the stream fails.
    pub fn read_line(&self) -> Result<Option<String>, TransportError> {
        let mut reader = self.reader.borrow_mut();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(TransportError::Read)?;
            if n == 0 {
                return Ok(None);
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                tracing::trace!("skipping blank inbound line");
                continue;
            }
            return Ok(Some(line.to_string()));
        }
    }

    /// Writes `line` plus a newline and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Write`] if writing or flushing fails.
    pub fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.borrow_mut();
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush())
            .map_err(TransportError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Shared(Rc<RefCell<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reads_lines_and_skips_blanks() {
        let transport = LineTransport::new(Cursor::new("one\n\n  \r\ntwo\r\nthree"), io::sink());
        assert_eq!(transport.read_line().expect("read"), Some("one".into()));
        assert_eq!(transport.read_line().expect("read"), Some("two".into()));
        assert_eq!(transport.read_line().expect("read"), Some("three".into()));
        assert_eq!(transport.read_line().expect("read"), None);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let transport = LineTransport::new(Cursor::new(b"a\xffb\n".to_vec()), io::sink());
        assert_eq!(transport.read_line().expect("read"), Some("a\u{fffd}b".into()));
    }

    #[test]
    fn writes_terminated_lines() {
        let out = Shared::default();
        let transport = LineTransport::new(Cursor::new(""), out.clone());
        transport.write_line("{}").expect("write");
        transport.write_line("[]").expect("write");
        assert_eq!(String::from_utf8_lossy(&out.0.borrow()), "{}\n[]\n");
    }

    #[test]
    fn write_failure_is_reported() {
        let transport = LineTransport::new(Cursor::new(""), Broken);
        let err = transport.write_line("x").expect_err("broken pipe");
        assert!(matches!(err, TransportError::Write(_)));
        assert_eq!(io::Error::from(err).kind(), io::ErrorKind::BrokenPipe);
    }
}
