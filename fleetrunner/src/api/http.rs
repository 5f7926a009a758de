//! HTTP transport abstraction for testability.
//!
//! The control-plane client and the daemon-set driver both talk HTTP; this
//! trait lets them be exercised in tests without a network. The real
//! implementation is a thin wrapper over `reqwest`.

use super::error::ApiError;
use std::future::Future;
use std::time::Duration;

/// HTTP method subset used by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    /// Method name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A raw HTTP response: status code plus body bytes.
///
/// Status handling is left to the caller so that the retry policy can
/// distinguish retryable gateway errors (502+) from terminal failures.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for asynchronous HTTP operations.
///
/// Implementations must drain the response body so the underlying
/// connection can be reused.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs a request with optional headers and optional JSON body.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `url` - Absolute URL to request
    /// * `headers` - Header name/value pairs to attach
    /// * `json_body` - Pre-serialized JSON body, sent with
    ///   `Content-Type: application/json` when present
    ///
    /// # Returns
    ///
    /// The status code and body bytes, or a transport-level error.
    fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(&str, String)],
        json_body: Option<String>,
    ) -> impl Future<Output = Result<HttpResponse, ApiError>> + Send;
}

/// Real HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the given per-request timeout.
    ///
    /// Connection pooling is enabled so that the poll loop reuses a warm
    /// connection to the control plane between ticks.
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ApiError::Transport {
                path: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(&str, String)],
        json_body: Option<String>,
    ) -> Result<HttpResponse, ApiError> {
        let mut request = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Delete => self.client.delete(url),
        };

        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        if let Some(body) = json_body {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        let response = request.send().await.map_err(|e| ApiError::Transport {
            path: url.to_string(),
            message: format!("request failed: {}", e),
        })?;

        let status = response.status().as_u16();

        // Always read the body to completion: this both surfaces error
        // details to the caller and releases the connection back to the
        // pool for reuse.
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport {
                path: url.to_string(),
                message: format!("failed to read response: {}", e),
            })?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A recorded request seen by the mock client.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: HttpMethod,
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub body: Option<String>,
    }

    /// Mock HTTP client that replays a scripted sequence of responses.
    ///
    /// Responses are consumed in order; the last one repeats once the
    /// script is exhausted. Every request is recorded for assertions.
    pub struct MockHttpClient {
        responses: Vec<Result<HttpResponse, ApiError>>,
        cursor: AtomicUsize,
        pub requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockHttpClient {
        pub fn new(responses: Vec<Result<HttpResponse, ApiError>>) -> Self {
            assert!(!responses.is_empty(), "mock needs at least one response");
            Self {
                responses,
                cursor: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Convenience: a mock that always answers 200 with `body`.
        pub fn ok(body: &str) -> Self {
            Self::new(vec![Ok(HttpResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
            })])
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl AsyncHttpClient for MockHttpClient {
        async fn request(
            &self,
            method: HttpMethod,
            url: &str,
            headers: &[(&str, String)],
            json_body: Option<String>,
        ) -> Result<HttpResponse, ApiError> {
            self.requests.lock().unwrap().push(RecordedRequest {
                method,
                url: url.to_string(),
                headers: headers
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.clone()))
                    .collect(),
                body: json_body,
            });
            let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
            self.responses[idx.min(self.responses.len() - 1)].clone()
        }
    }

    #[tokio::test]
    async fn mock_replays_in_order_then_repeats() {
        let mock = MockHttpClient::new(vec![
            Ok(HttpResponse {
                status: 503,
                body: Vec::new(),
            }),
            Ok(HttpResponse {
                status: 200,
                body: b"done".to_vec(),
            }),
        ]);

        let first = mock
            .request(HttpMethod::Get, "http://x/a", &[], None)
            .await
            .unwrap();
        assert_eq!(first.status, 503);

        let second = mock
            .request(HttpMethod::Get, "http://x/a", &[], None)
            .await
            .unwrap();
        assert_eq!(second.status, 200);

        let third = mock
            .request(HttpMethod::Get, "http://x/a", &[], None)
            .await
            .unwrap();
        assert_eq!(third.status, 200, "last response repeats");
        assert_eq!(mock.request_count(), 3);
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse {
            status: 204,
            body: Vec::new()
        }
        .is_success());
        assert!(!HttpResponse {
            status: 502,
            body: Vec::new()
        }
        .is_success());
    }
}
