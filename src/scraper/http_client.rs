use crate::config::ScraperConfig;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(StatusCode),
}

impl FetchError {
    /// Timeouts, connection failures, 429 and 5xx are worth another attempt.
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect(),
            FetchError::Status(s) => *s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error(),
        }
    }
}

pub struct HttpClient {
    inner: reqwest::Client,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            max_retries: config.max_retries,
        })
    }

    /// GET a URL as text, retrying transient failures with backoff.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let strategy = ExponentialBackoff::from_millis(250)
            .factor(2)
            .map(jitter)
            .take(self.max_retries as usize);

        let mut attempt = 0u32;
        RetryIf::start(
            strategy,
            || {
                attempt += 1;
                debug!("GET {} (attempt {})", url, attempt);
                self.get_once(url)
            },
            |e: &FetchError| {
                let retry = e.is_transient();
                if retry {
                    warn!("{} failed ({}), retrying", url, e);
                }
                retry
            },
        )
        .await
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_classified() {
        assert!(FetchError::Status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(FetchError::Status(StatusCode::BAD_GATEWAY).is_transient());
        assert!(!FetchError::Status(StatusCode::NOT_FOUND).is_transient());
        assert!(!FetchError::Status(StatusCode::FORBIDDEN).is_transient());
    }

    #[tokio::test]
    async fn test_malformed_url_is_not_retried() {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        assert!(!FetchError::Http(err).is_transient());
    }

    #[test]
    fn test_client_builds_from_defaults() {
        assert!(HttpClient::new(&ScraperConfig::default()).is_ok());
    }
}
