//! reqwest-backed image downloads.

use std::time::Duration;

use async_trait::async_trait;
use imagery_core::{FetchError, FetchedImage, ImageFetcher};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{fetch_error, Result};
use crate::env_parse;

/// Download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpFetcherConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Largest body accepted, in bytes.
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        HttpFetcherConfig {
            timeout: Duration::from_secs(20),
            max_bytes: 15 * 1024 * 1024,
            user_agent: concat!("article-imagery/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpFetcherConfig {
    /// Defaults overridden by `IMAGERY_FETCH_*` variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_parse::<u64>("IMAGERY_FETCH_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = env_parse::<u64>("IMAGERY_FETCH_MAX_BYTES") {
            config.max_bytes = bytes;
        }
        if let Ok(agent) = std::env::var("IMAGERY_FETCH_USER_AGENT") {
            if !agent.trim().is_empty() {
                config.user_agent = agent.trim().to_string();
            }
        }
        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }
}

/// [`ImageFetcher`] over plain HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    config: HttpFetcherConfig,
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(HttpImageFetcher { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(HttpFetcherConfig::from_env())
    }

    pub fn config(&self) -> &HttpFetcherConfig {
        &self.config
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    #[instrument(skip(self), fields(limit = self.config.max_bytes))]
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedImage, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(ct) = content_type.as_deref() {
            if !is_image_content_type(ct) {
                return Err(FetchError::NotAnImage {
                    url: url.to_string(),
                    content_type: ct.to_string(),
                });
            }
        }

        let limit = self.config.max_bytes;
        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit,
        };
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| fetch_error(url, e))? {
            if (bytes.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }

        debug!(size = bytes.len(), content_type = ?content_type, "image downloaded");
        Ok(FetchedImage::new(bytes, content_type.as_deref()))
    }
}

/// `image/*`, or the generic binary type some CDNs send for everything.
pub fn is_image_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("image/") || mime == "application/octet-stream"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `response` verbatim to every connection; returns the base URL.
    async fn serve(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let response = response.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn http_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn fetcher(max_bytes: u64) -> HttpImageFetcher {
        HttpImageFetcher::new(
            HttpFetcherConfig::default()
                .with_timeout(Duration::from_secs(5))
                .with_max_bytes(max_bytes),
        )
        .unwrap()
    }

    #[test]
    fn test_content_type_acceptance() {
        assert!(is_image_content_type("image/png"));
        assert!(is_image_content_type("Image/JPEG; charset=binary"));
        assert!(is_image_content_type("application/octet-stream"));
        assert!(!is_image_content_type("text/html; charset=utf-8"));
        assert!(!is_image_content_type("application/json"));
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_content_type() {
        let body = b"\x89PNG\r\n\x1a\nnot-really-a-png".to_vec();
        let base = serve(http_response("200 OK", "image/png", &body)).await;

        let fetched = fetcher(1024).fetch(&format!("{base}/a.png")).await.unwrap();
        assert_eq!(fetched.bytes, body);
        assert_eq!(fetched.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let base = serve(http_response("404 Not Found", "text/plain", b"gone")).await;
        let err = fetcher(1024).fetch(&format!("{base}/a.png")).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_html_page_is_not_an_image() {
        let base = serve(http_response("200 OK", "text/html", b"<html></html>")).await;
        let err = fetcher(1024).fetch(&format!("{base}/a.png")).await.unwrap_err();
        assert!(matches!(err, FetchError::NotAnImage { .. }));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let base = serve(http_response("200 OK", "image/jpeg", &[0u8; 2048])).await;
        let err = fetcher(1024).fetch(&format!("{base}/a.jpg")).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_empty_body_is_rejected() {
        let base = serve(http_response("200 OK", "image/png", b"")).await;
        let err = fetcher(1024).fetch(&format!("{base}/a.png")).await.unwrap_err();
        assert!(matches!(err, FetchError::Empty { .. }));
    }
}
