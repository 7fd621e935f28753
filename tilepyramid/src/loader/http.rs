//! HTTP client abstraction for testability.

use std::time::Duration;

use thiserror::Error;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level failures. Any of these leaves the tile retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// Connect, timeout or protocol failure.
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The response body could not be read.
    #[error("failed to read response from {url}: {message}")]
    Body { url: String, message: String },
}

/// Status and body of a completed request.
///
/// Non-success statuses are not errors here; the remote loader decides what
/// they mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Trait for HTTP client operations.
///
/// Allows mock clients to stand in for the network in tests.
pub trait HttpClient: Send + Sync {
    /// Performs a blocking HTTP GET request.
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client with the default 30 second timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Mock HTTP client returning one canned response and recording URLs.
    pub struct MockHttpClient {
        pub response: Result<HttpResponse, FetchError>,
        pub requests: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn new(response: Result<HttpResponse, FetchError>) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for MockHttpClient {
        fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
            self.requests.lock().push(url.to_string());
            self.response.clone()
        }
    }

    #[test]
    fn test_mock_client_records_requests() {
        let mock = MockHttpClient::new(Ok(HttpResponse::new(200, vec![1, 2, 3])));

        let response = mock.get("http://example.com/a").unwrap();
        assert!(response.is_ok());
        assert_eq!(response.body, vec![1, 2, 3]);
        assert_eq!(*mock.requests.lock(), vec!["http://example.com/a".to_string()]);
    }

    #[test]
    fn test_not_found_is_a_response() {
        let response = HttpResponse::new(404, Vec::new());
        assert!(!response.is_ok());
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Request {
            url: "http://localhost/x".to_string(),
            message: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "request to http://localhost/x failed: timed out");
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestClient::with_timeout(Duration::from_secs(1)).is_ok());
    }
}
