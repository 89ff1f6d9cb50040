use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::io;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Header carrying the call id back to the invoker.
pub const CALL_ID_HEADER: &str = "FN_CALL_ID";
/// Diagnostic header with the time a call waited between assembly and start.
pub const QUEUE_WAIT_HEADER: &str = "XXX-FXLB-WAIT";

/// Where a call's output goes.
pub trait OutputSink: Send + Sync {
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// The HTTP response behind this sink, if there is one.
    fn response_writer(&self) -> Option<&dyn ResponseWriter> {
        None
    }
}

pub trait ResponseWriter: Send + Sync {
    fn add_header(&self, name: &str, value: &str);
    fn set_header(&self, name: &str, value: &str);
}

/// In-memory HTTP response: headers can be written before the body exists,
/// and the invoker keeps a handle to read them back even if the call never
/// gets assembled.
#[derive(Debug, Default)]
pub struct HttpResponseSink {
    headers: Mutex<HeaderMap>,
    body: Mutex<Vec<u8>>,
}

impl HttpResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> HeaderMap {
        self.headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First value of `name`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    pub fn body(&self) -> Vec<u8> {
        self.body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn parse(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => Some((name, value)),
            _ => {
                warn!(header = %name, "Dropping invalid response header");
                None
            }
        }
    }
}

impl OutputSink for HttpResponseSink {
    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(())
    }

    fn response_writer(&self) -> Option<&dyn ResponseWriter> {
        Some(self)
    }
}

impl ResponseWriter for HttpResponseSink {
    fn add_header(&self, name: &str, value: &str) {
        if let Some((name, value)) = Self::parse(name, value) {
            self.headers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .append(name, value);
        }
    }

    fn set_header(&self, name: &str, value: &str) {
        if let Some((name, value)) = Self::parse(name, value) {
            self.headers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive_and_multi_valued() {
        let sink = HttpResponseSink::new();
        sink.add_header(CALL_ID_HEADER, "abc");
        sink.add_header("X-Custom", "one");
        sink.add_header("X-Custom", "two");
        sink.set_header(QUEUE_WAIT_HEADER, "1ms");
        sink.set_header(QUEUE_WAIT_HEADER, "2ms");

        assert_eq!(sink.header("fn_call_id").as_deref(), Some("abc"));
        assert_eq!(sink.headers().get_all("x-custom").iter().count(), 2);
        assert_eq!(sink.header(QUEUE_WAIT_HEADER).as_deref(), Some("2ms"));
    }

    #[test]
    fn test_invalid_header_dropped() {
        let sink = HttpResponseSink::new();
        sink.add_header("bad header", "x");
        sink.add_header("X-Ok", "line\nbreak");
        assert!(sink.headers().is_empty());
    }

    #[test]
    fn test_body() {
        let sink = HttpResponseSink::new();
        sink.write_all(b"hello ").unwrap();
        sink.write_all(b"world").unwrap();
        assert_eq!(sink.body(), b"hello world");
        assert!(sink.response_writer().is_some());
    }
}
