//! HTTP client for the analysis service.
//!
//! [`AnalysisBackend`] is the seam the controller talks to; [`HttpAnalysisBackend`]
//! is the reqwest implementation. Use [`HttpAnalysisBackend::builder`] to
//! construct one.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::types::{
    AnalyzeRequest, AnalyzeResponse, HealthResponse, StatisticsResponse, ValidateRequest,
    ValidateResponse,
};
use crate::config::DEFAULT_API_BASE_URL;
use crate::error::DevroomError;

/// Calls the analysis controller depends on.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    fn base_url(&self) -> &str;

    /// `POST /analyze`. Exactly one request per call.
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, DevroomError>;

    /// `GET /statistics`.
    async fn statistics(&self) -> Result<StatisticsResponse, DevroomError>;

    /// `GET /health`.
    async fn health(&self) -> Result<HealthResponse, DevroomError>;

    /// `POST /validate`: static checks only, nothing is executed.
    async fn validate(&self, request: &ValidateRequest) -> Result<ValidateResponse, DevroomError>;
}

/// reqwest-backed [`AnalysisBackend`].
#[derive(Debug, Clone)]
pub struct HttpAnalysisBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAnalysisBackend {
    pub fn builder(base_url: impl Into<String>) -> HttpAnalysisBackendBuilder {
        HttpAnalysisBackendBuilder::new(base_url)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DevroomError> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DevroomError::request(&url, &e))?;
        read_json(url, resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, DevroomError> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| DevroomError::request(&url, &e))?;
        read_json(url, resp).await
    }
}

/// Decode a JSON body.
///
/// The service answers validation failures with a 4xx/5xx status *and* a
/// `{success: false, error}` body, so the body is parsed regardless of status.
/// Only when it does not parse does a non-2xx status become the error.
async fn read_json<T: DeserializeOwned>(
    url: String,
    resp: reqwest::Response,
) -> Result<T, DevroomError> {
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| DevroomError::request(&url, &e))?;

    match serde_json::from_slice::<T>(&bytes) {
        Ok(value) => {
            if !status.is_success() {
                debug!(url = %url, status = status.as_u16(), "non-2xx response carried a JSON body");
            }
            Ok(value)
        }
        Err(e) if !status.is_success() => {
            warn!(url = %url, status = status.as_u16(), error = %e, "request failed");
            Err(DevroomError::RequestFailure {
                url,
                detail: format!("HTTP {}", status.as_u16()),
            })
        }
        Err(e) => {
            warn!(url = %url, error = %e, "response body is not the expected JSON");
            Err(DevroomError::RequestFailure {
                url,
                detail: format!("invalid response body: {e}"),
            })
        }
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, DevroomError> {
        self.post_json("analyze", request).await
    }

    async fn statistics(&self) -> Result<StatisticsResponse, DevroomError> {
        self.get_json("statistics").await
    }

    async fn health(&self) -> Result<HealthResponse, DevroomError> {
        self.get_json("health").await
    }

    async fn validate(&self, request: &ValidateRequest) -> Result<ValidateResponse, DevroomError> {
        self.post_json("validate", request).await
    }
}

/// Builder for [`HttpAnalysisBackend`].
///
/// ```rust,ignore
/// let backend = HttpAnalysisBackend::builder("http://localhost:5000/api")
///     .request_timeout(Duration::from_secs(60))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct HttpAnalysisBackendBuilder {
    base_url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl HttpAnalysisBackendBuilder {
    /// Defaults: connect timeout 3 s, request timeout 30 s.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound on a whole request, including reading the body.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> HttpAnalysisBackend {
        // Client construction only fails when the TLS backend cannot start;
        // the default client is still usable for plain HTTP.
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .unwrap_or_default();

        let base_url = self.base_url.trim_end_matches('/').to_string();
        HttpAnalysisBackend { base_url, client }
    }
}

impl Default for HttpAnalysisBackendBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::FileType;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server: answers the first request with `status` and
    /// `body`, and hands back the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let mut request = Vec::new();
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{addr}/api"), handle)
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let backend = HttpAnalysisBackend::builder("http://localhost:5000/api/").build();
        assert_eq!(backend.base_url(), "http://localhost:5000/api");
        assert_eq!(backend.url("analyze"), "http://localhost:5000/api/analyze");
    }

    #[test]
    fn default_builder_targets_local_server() {
        let backend = HttpAnalysisBackendBuilder::default().build();
        assert_eq!(backend.base_url(), DEFAULT_API_BASE_URL);
    }

    #[tokio::test]
    async fn analyze_posts_json_body() {
        let (base, server) = serve_once("200 OK", r#"{"success":true,"analysis":{}}"#).await;
        let backend = HttpAnalysisBackend::builder(base).build();
        let resp = backend
            .analyze(&AnalyzeRequest {
                code: "print(1)".to_string(),
                file_type: FileType::Python,
                execute: true,
                save_history: false,
            })
            .await
            .unwrap();
        assert!(resp.success);
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/analyze"), "request: {request}");
        assert!(request.contains(r#""file_type":"python""#), "request: {request}");
        assert!(request.contains(r#""save_history":false"#), "request: {request}");
    }

    #[tokio::test]
    async fn error_status_with_json_body_is_parsed() {
        let (base, server) =
            serve_once("400 Bad Request", r#"{"success":false,"error":"no code given"}"#).await;
        let backend = HttpAnalysisBackend::builder(base).build();
        let resp = backend.statistics().await.unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("no code given"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn error_status_without_json_is_request_failure() {
        let (base, server) = serve_once("502 Bad Gateway", "upstream down").await;
        let backend = HttpAnalysisBackend::builder(base).build();
        match backend.health().await {
            Err(DevroomError::RequestFailure { url, detail }) => {
                assert!(url.ends_with("/api/health"), "url: {url}");
                assert_eq!(detail, "HTTP 502");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn garbage_body_is_request_failure() {
        let (base, server) = serve_once("200 OK", "<html>oops</html>").await;
        let backend = HttpAnalysisBackend::builder(base).build();
        let err = backend.statistics().await.unwrap_err();
        assert!(matches!(err, DevroomError::RequestFailure { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_is_request_failure() {
        let backend = HttpAnalysisBackend::builder("http://127.0.0.1:9/api")
            .connect_timeout(Duration::from_secs(2))
            .build();
        let err = backend.health().await.unwrap_err();
        match err {
            DevroomError::RequestFailure { url, .. } => assert_eq!(url, "http://127.0.0.1:9/api/health"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
