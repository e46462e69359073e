//! Log file writer for the file tracing layer.
//!
//! [`LogFileMakeWriter`] hands each event a buffering writer that appends
//! the whole formatted line to the log file under a lock when dropped.
//! The file layer should be built with `.with_ansi(false)`.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

/// Log file name inside the log directory.
pub const LOG_FILE_NAME: &str = "rlm-sandbox.log";

/// Opens `<log_dir>/rlm-sandbox.log` in append mode.
///
/// Returns `None` if the directory or file cannot be created; file
/// logging is then skipped with a warning on stderr.
pub fn open_log_file(log_dir: &Path) -> Option<Arc<Mutex<File>>> {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!(
            "Warning: cannot create log directory {}: {e}",
            log_dir.display()
        );
        return None;
    }

    let log_path = log_dir.join(LOG_FILE_NAME);
    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(Arc::new(Mutex::new(file))),
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {e}", log_path.display());
            None
        }
    }
}

/// [`MakeWriter`](tracing_subscriber::fmt::MakeWriter) for the file layer.
#[derive(Clone)]
pub struct LogFileMakeWriter {
    file: Arc<Mutex<File>>,
}

impl LogFileMakeWriter {
    pub fn new(file: Arc<Mutex<File>>) -> Self {
        Self { file }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileMakeWriter {
    type Writer = EventWriter;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter {
            file: Arc::clone(&self.file),
            buf: Vec::with_capacity(256),
        }
    }
}

/// Per-event writer. Appends its buffer to the file on [`Drop`].
pub struct EventWriter {
    file: Arc<Mutex<File>>,
    buf: Vec<u8>,
}

impl Write for EventWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }

        let mut file = self.file.lock();
        let _ = file.write_all(&self.buf);
        let _ = file.flush();
    }
}
