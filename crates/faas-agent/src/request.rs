use crate::event::is_cloud_event_media_type;
use crate::payload::{empty_body, Body};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use faas_common::Headers;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

/// An inbound HTTP invocation as handed over by the routing layer.
pub struct InvocationRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Whether the request arrived over TLS; decides the scheme of the call URL.
    pub tls: bool,
    pub body: Body,
}

impl std::fmt::Debug for InvocationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

impl InvocationRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            tls: false,
            body: empty_body(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.body = Box::new(body);
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Absolute URL of the request. Scheme and host are filled in from the
    /// connection and the `Host` header when the request line omits them.
    pub fn url(&self) -> String {
        let scheme = self
            .uri
            .scheme_str()
            .unwrap_or(if self.tls { "https" } else { "http" });
        let host = self
            .uri
            .authority()
            .map(|a| a.as_str().to_owned())
            .or_else(|| {
                self.headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_owned)
            })
            .unwrap_or_default();
        let path = self
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        format!("{scheme}://{host}{path}")
    }

    /// Headers in the serializable form stored on the call. Values that are
    /// not valid UTF-8 are skipped.
    pub fn header_map(&self) -> Headers {
        let mut out = Headers::new();
        for (name, value) in &self.headers {
            match value.to_str() {
                Ok(v) => out
                    .entry(name.as_str().to_owned())
                    .or_default()
                    .push(v.to_owned()),
                Err(_) => debug!(header = %name, "Skipping non UTF-8 request header"),
            }
        }
        out
    }

    /// Whether the body is a structured-mode CloudEvent. Missing or malformed
    /// content types are treated as a plain request.
    pub fn is_cloud_event(&self) -> bool {
        let Some(content_type) = self.headers.get(header::CONTENT_TYPE) else {
            debug!("No Content-Type header on request");
            return false;
        };
        match content_type
            .to_str()
            .map_err(|e| e.to_string())
            .and_then(is_cloud_event_media_type)
        {
            Ok(is_event) => is_event,
            Err(e) => {
                warn!(error = %e, "Could not parse Content-Type header");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> InvocationRequest {
        InvocationRequest::new(Method::POST, uri.parse().unwrap())
    }

    #[test]
    fn test_url_from_host_header() {
        let req = request("/r/myapp/hello?x=1")
            .with_header(header::HOST, HeaderValue::from_static("fn.example.com:8080"));
        assert_eq!(req.url(), "http://fn.example.com:8080/r/myapp/hello?x=1");
        assert_eq!(req.with_tls(true).url(), "https://fn.example.com:8080/r/myapp/hello?x=1");
    }

    #[test]
    fn test_absolute_uri_kept() {
        let req = request("https://api.example.com/t/app/src");
        assert_eq!(req.url(), "https://api.example.com/t/app/src");
    }

    #[test]
    fn test_content_type_detection() {
        let ce = |v: &'static str| {
            request("/").with_header(header::CONTENT_TYPE, HeaderValue::from_static(v))
        };
        assert!(ce("application/cloudevents+json; charset=UTF-8").is_cloud_event());
        assert!(ce("application/cloudevents+json").is_cloud_event());
        assert!(!ce("application/json").is_cloud_event());
        assert!(!ce("garbage").is_cloud_event());
        assert!(!request("/").is_cloud_event());
    }

    #[test]
    fn test_header_map_multi_values() {
        let req = request("/")
            .with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("1"))
            .with_header(HeaderName::from_static("x-a"), HeaderValue::from_static("2"));
        assert_eq!(req.header_map()["x-a"], vec!["1", "2"]);
    }
}
