//! HTTP fetcher for the remote quiz source.
//!
//! `ApiClient` issues a single GET per call with bounded timeouts and
//! returns the raw body. Callers may run several fetches concurrently; each
//! is independent and cloning the client shares the connection pool.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, ClientBuilder, Url};
use tracing::{debug, warn};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Connect and per-read timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Total transfer timeout in seconds, covering connect, headers and body.
const RESOURCE_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("quizcache/", env!("CARGO_PKG_VERSION"));

/// Timeouts applied to every fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTimeouts {
    /// Bound on connecting and on each wait for response data.
    pub request: Duration,
    /// Bound on the whole request, body included. Should exceed `request`.
    pub resource: Duration,
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            resource: Duration::from_secs(RESOURCE_TIMEOUT_SECS),
        }
    }
}

/// Source of raw quiz payloads.
///
/// The repository only talks to this trait so tests can substitute a fake.
#[async_trait]
pub trait QuizFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

/// HTTP client for the quiz source.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    /// Create a new API client with default timeouts
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeouts(FetchTimeouts::default())
    }

    pub fn with_timeouts(timeouts: FetchTimeouts) -> anyhow::Result<Self> {
        let client = Self::client_builder(&timeouts).build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client.
    pub fn with_http_client(client: Client) -> Self {
        Self { client }
    }

    fn client_builder(timeouts: &FetchTimeouts) -> ClientBuilder {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(timeouts.request)
            .read_timeout(timeouts.request)
            .timeout(timeouts.resource)
    }

    /// Check that a URL is something we can actually request.
    fn parse_url(url: &str) -> Result<Url, ApiError> {
        let parsed = Url::parse(url.trim()).map_err(|e| {
            debug!(url = url, error = %e, "Rejected malformed URL");
            ApiError::InvalidUrl(url.to_string())
        })?;

        let has_host = parsed.host_str().is_some_and(|h| !h.is_empty());
        if !matches!(parsed.scheme(), "http" | "https") || !has_host {
            debug!(url = url, scheme = parsed.scheme(), "Rejected unsupported URL");
            return Err(ApiError::InvalidUrl(url.to_string()));
        }
        Ok(parsed)
    }

    /// Fetch the raw payload at `url`.
    pub async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let parsed = Self::parse_url(url)?;

        let response = self.client.get(parsed).send().await.map_err(|e| {
            let err = ApiError::from_reqwest(&e);
            warn!(url = url, kind = err.kind(), error = %e, "Quiz fetch failed");
            err
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = url, status = status.as_u16(), "Quiz source returned error status");
            return Err(ApiError::HttpError(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            let err = ApiError::from_reqwest(&e);
            warn!(url = url, kind = err.kind(), error = %e, "Failed to read quiz response body");
            err
        })?;

        if body.is_empty() {
            return Err(ApiError::NoData);
        }

        debug!(url = url, bytes = body.len(), "Quiz payload received");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl QuizFetcher for ApiClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.fetch_raw(url).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_client(timeouts: FetchTimeouts) -> ApiClient {
        let client = ApiClient::client_builder(&timeouts)
            .no_proxy()
            .build()
            .expect("build test client");
        ApiClient::with_http_client(client)
    }

    /// Serve one canned HTTP response on a loopback port, returning its URL.
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/questions.json", addr)
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    #[test]
    fn test_parse_url() {
        assert!(ApiClient::parse_url("http://tednewardsandbox.site44.com/questions.json").is_ok());
        assert!(ApiClient::parse_url(" https://example.com/q.json ").is_ok());

        for bad in ["", "not a url", "ftp://example.com/q.json", "file:///tmp/q.json", "http://"] {
            assert_eq!(
                ApiClient::parse_url(bad).unwrap_err(),
                ApiError::InvalidUrl(bad.to_string()),
                "{:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_request() {
        let client = test_client(FetchTimeouts::default());
        let err = client.fetch("::::").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_fetch_returns_raw_body() {
        let body = r#"[{"title":"T","questions":[]}]"#;
        let url = serve_once(http_response("200 OK", body)).await;
        let bytes = test_client(FetchTimeouts::default()).fetch(&url).await.unwrap();
        assert_eq!(bytes, body.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_does_not_inspect_payload() {
        let url = serve_once(http_response("200 OK", "definitely not json")).await;
        let bytes = test_client(FetchTimeouts::default()).fetch(&url).await.unwrap();
        assert_eq!(bytes, b"definitely not json");
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let url = serve_once(http_response("500 Internal Server Error", "oops")).await;
        let err = test_client(FetchTimeouts::default()).fetch(&url).await.unwrap_err();
        assert_eq!(err, ApiError::HttpError(500));
    }

    #[tokio::test]
    async fn test_empty_body_is_no_data() {
        let url = serve_once(http_response("200 OK", "")).await;
        let err = test_client(FetchTimeouts::default()).fetch(&url).await.unwrap_err();
        assert_eq!(err, ApiError::NoData);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection open without answering
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = test_client(FetchTimeouts {
            request: Duration::from_secs(2),
            resource: Duration::from_millis(200),
        });
        let err = client
            .fetch(&format!("http://{}/questions.json", addr))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Timeout);
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = test_client(FetchTimeouts::default())
            .fetch(&format!("http://{}/questions.json", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NetworkError(_)), "{:?}", err);
    }
}
