use crate::sink::OutputSink;
use faas_common::CallParams;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const TRUNCATED_MARKER: &[u8] = b"\n[log truncated]\n";

/// Bounded capture of a call's stderr (and stdout, for calls without an
/// output writer). Complete lines are also emitted as debug events tagged with
/// the call and app ids.
#[derive(Debug, Clone)]
pub struct CallLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug)]
struct LogInner {
    call_id: String,
    app_id: String,
    buf: Vec<u8>,
    pending_line: Vec<u8>,
    max_size: usize,
    truncated: bool,
    closed: bool,
}

impl CallLog {
    pub fn new(params: &CallParams, max_size: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                call_id: params.id.clone(),
                app_id: params.app_id.clone(),
                buf: Vec::new(),
                pending_line: Vec::new(),
                max_size: usize::try_from(max_size).unwrap_or(usize::MAX),
                truncated: false,
                closed: false,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contents(&self) -> Vec<u8> {
        self.lock().buf.clone()
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock().buf).into_owned()
    }

    pub fn is_truncated(&self) -> bool {
        self.lock().truncated
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Stop accepting writes. Buffered contents stay readable.
    pub fn close(&self) {
        let mut inner = self.lock();
        if !inner.pending_line.is_empty() {
            let line = std::mem::take(&mut inner.pending_line);
            inner.emit(&line);
        }
        inner.closed = true;
    }
}

impl LogInner {
    fn emit(&self, line: &[u8]) {
        debug!(
            call_id = %self.call_id,
            app_id = %self.app_id,
            "{}",
            String::from_utf8_lossy(line)
        );
    }

    fn append(&mut self, data: &[u8]) {
        if self.truncated {
            return;
        }
        let room = self.max_size.saturating_sub(self.buf.len());
        if data.len() <= room {
            self.buf.extend_from_slice(data);
        } else {
            self.buf.extend_from_slice(&data[..room]);
            self.buf.extend_from_slice(TRUNCATED_MARKER);
            self.truncated = true;
        }
    }
}

impl OutputSink for CallLog {
    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "call log closed"));
        }
        inner.append(data);

        inner.pending_line.extend_from_slice(data);
        while let Some(pos) = inner.pending_line.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = inner.pending_line.drain(..=pos).collect();
            inner.emit(&line[..line.len() - 1]);
        }
        // keep a runaway line from growing without bound
        if inner.pending_line.len() > inner.max_size {
            let line = std::mem::take(&mut inner.pending_line);
            inner.emit(&line);
        }
        Ok(())
    }
}
