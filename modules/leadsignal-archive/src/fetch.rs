use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

use crate::error::{FetchError, FetchResult};

/// Base backoff for retries. Actual delay is base * 2^attempt + jitter.
const RETRY_BASE: Duration = Duration::from_secs(1);

const USER_AGENT: &str = concat!("leadsignal/", env!("CARGO_PKG_VERSION"));

// --- ContentFetcher trait ---

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the page body as HTML. Single attempt; the retry loop lives
    /// in `fetch_with_retry`.
    async fn fetch(&self, url: &str) -> FetchResult<String>;
    fn name(&self) -> &str;
}

/// Retry transient failures with exponential backoff (1s, 2s, 4s...) plus
/// random jitter (0-1s). Terminal failures return immediately.
pub async fn fetch_with_retry(
    fetcher: &dyn ContentFetcher,
    url: &str,
    max_attempts: u32,
) -> FetchResult<String> {
    for attempt in 0..max_attempts {
        match fetcher.fetch(url).await {
            Ok(body) => return Ok(body),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let backoff = RETRY_BASE * 2u32.pow(attempt);
                let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                warn!(
                    url,
                    fetcher = fetcher.name(),
                    attempt = attempt + 1,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "Fetch failed, retrying after backoff"
                );
                tokio::time::sleep(backoff + jitter).await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(FetchError::Unreachable(format!(
        "no fetch attempts made for {url}"
    )))
}

// --- Plain HTTP fetcher ---

/// Straight reqwest GET. Covers static pages; targets that render content
/// client-side need the `RenderFetcher`.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client, timeout }
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<String> {
        check_scheme(url)?;
        info!(url, fetcher = "http", "Fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_send_error(&e, self.timeout))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::BlockedByTarget {
                status: status.as_u16(),
            });
        }

        // PDFs, images and the like are not distillable.
        if let Some(ct) = response.headers().get(CONTENT_TYPE) {
            let ct = ct.to_str().unwrap_or("");
            if !ct.is_empty() && !is_text_content_type(ct) {
                return Err(FetchError::Malformed(format!(
                    "unsupported content type: {ct}"
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Malformed(format!("failed to read body: {e}")))?;

        if body.trim().is_empty() {
            return Err(FetchError::Malformed("empty body".to_string()));
        }

        info!(url, fetcher = "http", bytes = body.len(), "Fetched successfully");
        Ok(body)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// --- Rendering fetcher ---

/// Fetches through a headless-browser rendering service: POST
/// `{base}/content` with the target URL, get fully rendered HTML back.
pub struct RenderFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl RenderFetcher {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Self {
        info!(base_url, "RenderFetcher initialized");
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(|t| t.to_string()),
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        match &self.token {
            Some(token) => format!("{}/content?token={}", self.base_url, token),
            None => format!("{}/content", self.base_url),
        }
    }
}

#[async_trait]
impl ContentFetcher for RenderFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<String> {
        check_scheme(url)?;
        info!(url, fetcher = "render", "Fetching page");

        let response = self
            .client
            .post(self.endpoint())
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| classify_send_error(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            // The render service sits on our side of the fence, so its
            // failures count as transient rather than target blocks.
            return Err(FetchError::Unreachable(format!(
                "render service returned HTTP {status}: {message}"
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Malformed(format!("failed to read body: {e}")))?;

        if html.trim().is_empty() {
            return Err(FetchError::Malformed("empty rendered page".to_string()));
        }

        info!(url, fetcher = "render", bytes = html.len(), "Fetched successfully");
        Ok(html)
    }

    fn name(&self) -> &str {
        "render"
    }
}

fn check_scheme(url: &str) -> FetchResult<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| FetchError::Malformed(format!("invalid URL: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(FetchError::Malformed(format!(
            "only http/https URLs are allowed, got: {}",
            parsed.scheme()
        )));
    }
    Ok(())
}

fn classify_send_error(e: &reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout.as_secs())
    } else {
        FetchError::Unreachable(e.to_string())
    }
}

fn is_text_content_type(ct: &str) -> bool {
    let ct = ct.to_ascii_lowercase();
    ct.contains("html") || ct.contains("text/plain") || ct.contains("xml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails a fixed number of times, then succeeds.
    struct FlakyFetcher {
        calls: AtomicU32,
        failures: u32,
        error_status: u16,
    }

    impl FlakyFetcher {
        fn new(failures: u32, error_status: u16) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                error_status,
            }
        }
    }

    #[async_trait]
    impl ContentFetcher for FlakyFetcher {
        async fn fetch(&self, _url: &str) -> FetchResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::BlockedByTarget {
                    status: self.error_status,
                })
            } else {
                Ok("<html>ok</html>".to_string())
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_succeeds() {
        let fetcher = FlakyFetcher::new(2, 503);
        let body = fetch_with_retry(&fetcher, "https://acme.example", 3)
            .await
            .unwrap();
        assert_eq!(body, "<html>ok</html>");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let fetcher = FlakyFetcher::new(10, 500);
        let err = fetch_with_retry(&fetcher, "https://acme.example", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BlockedByTarget { status: 500 }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_failures_do_not_retry() {
        let fetcher = FlakyFetcher::new(10, 404);
        let err = fetch_with_retry(&fetcher, "https://acme.example", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BlockedByTarget { status: 404 }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let fetcher = HttpFetcher::new(Duration::from_secs(5));
        let err = fetcher.fetch("ftp://acme.example/file").await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn text_content_types() {
        assert!(is_text_content_type("text/html; charset=utf-8"));
        assert!(is_text_content_type("application/xhtml+xml"));
        assert!(is_text_content_type("text/plain"));
        assert!(!is_text_content_type("application/pdf"));
        assert!(!is_text_content_type("image/png"));
    }
}
