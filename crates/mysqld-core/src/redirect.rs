//! Child process output redirected into `tracing`.
//!
//! [`OutputRedirector`] is a line-buffering sink: bytes accumulate until
//! `flush`, then every buffered line becomes one log event at the sink's
//! fixed level. [`pump`] drives a sink from a child stream on its own thread.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, trace, warn, Level};

/// Callback invoked with every emitted line.
pub type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Adapts a byte stream into one log event per line.
pub struct OutputRedirector {
    label: String,
    level: Level,
    buffer: Vec<u8>,
    observer: Option<LineObserver>,
}

impl OutputRedirector {
    /// Create a sink emitting at `level`, prefixing lines with `label`.
    pub fn new(label: impl Into<String>, level: Level) -> Self {
        Self {
            label: label.into(),
            level,
            buffer: Vec::new(),
            observer: None,
        }
    }

    /// Sink for a child's standard output.
    pub fn stdout(label: impl Into<String>) -> Self {
        Self::new(label, Level::INFO)
    }

    /// Sink for a child's standard error.
    pub fn stderr(label: impl Into<String>) -> Self {
        Self::new(label, Level::DEBUG)
    }

    /// Also hand every emitted line to `observer`.
    pub fn with_observer(mut self, observer: LineObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Bytes written since the last flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn emit(&self, line: &str) {
        // Event levels must be constant, so dispatch per level.
        if self.level == Level::ERROR {
            error!("[{}] {}", self.label, line);
        } else if self.level == Level::WARN {
            warn!("[{}] {}", self.label, line);
        } else if self.level == Level::INFO {
            info!("[{}] {}", self.label, line);
        } else if self.level == Level::DEBUG {
            debug!("[{}] {}", self.label, line);
        } else {
            trace!("[{}] {}", self.label, line);
        }
        if let Some(observer) = &self.observer {
            observer(line);
        }
    }
}

impl Write for OutputRedirector {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let text = String::from_utf8_lossy(&self.buffer);
            let text = text.trim_end_matches(['\r', '\n']);
            for line in text.split(['\r', '\n']).filter(|line| !line.is_empty()) {
                self.emit(line);
            }
        }
        self.buffer.clear();
        Ok(())
    }
}

/// Copy `reader` into `sink` line by line on a named background thread.
///
/// The thread ends when the stream reaches EOF, which happens once the child
/// exits or closes the pipe.
pub fn pump<R>(reader: R, mut sink: OutputRedirector, thread_name: String) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    std::thread::Builder::new().name(thread_name).spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut chunk = Vec::new();
        loop {
            chunk.clear();
            match reader.read_until(b'\n', &mut chunk) {
                Ok(0) => break,
                Ok(_) => {
                    if sink.write_all(&chunk).and_then(|_| sink.flush()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Output pump for [{}] stopped: {}", sink.label, e);
                    break;
                }
            }
        }
        let _ = sink.flush();
    })
}
