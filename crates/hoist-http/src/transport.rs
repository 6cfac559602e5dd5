use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::client::{HttpClient, Request, Response};
use crate::error::HttpError;

/// Server error codes considered transient and retried automatically:
/// bad gateway, service unavailable, gateway timeout.
pub const TRANSIENT_STATUS: [u16; 3] = [502, 503, 504];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay, doubled on every retry.
    pub backoff_base: Duration,
    /// Upper bound on any single delay.
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(10),
        }
    }
}

/// Calculate the delay before a retry attempt using exponential backoff.
///
/// The delay for retry `n` (0-indexed) is `base * 2^n`, capped.
pub fn retry_delay(retry_count: u32, policy: &RetryPolicy) -> Duration {
    let multiplier = 2_u32.saturating_pow(retry_count);
    policy
        .backoff_base
        .saturating_mul(multiplier)
        .min(policy.backoff_cap)
}

/// An authenticated endpoint: base URL, bearer token, and retry policy
/// over a shared [`HttpClient`].
///
/// Cloning is cheap; [`Transport::scoped`] derives the storage-endpoint
/// transport for a dataset transfer session from the main-API one.
#[derive(Clone)]
pub struct Transport {
    client: Arc<dyn HttpClient>,
    base_url: String,
    token: String,
    user_agent: String,
    retry: RetryPolicy,
}

impl Transport {
    pub fn new(
        client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            user_agent: concat!("hoist/", env!("CARGO_PKG_VERSION")).to_string(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Same client and retry policy, different endpoint and credential.
    pub fn scoped(&self, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Arc::clone(&self.client),
            base_url: base_url.into(),
            token: token.into(),
            user_agent: self.user_agent.clone(),
            retry: self.retry.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request whose `url` is a path relative to this transport's
    /// base, attaching the bearer token.
    pub async fn send(&self, request: Request) -> Result<Response, HttpError> {
        self.dispatch(request, true).await
    }

    /// Send a request whose `url` is already absolute (e.g. a transient
    /// signed download URL). No Authorization header is attached.
    pub async fn send_absolute(&self, request: Request) -> Result<Response, HttpError> {
        self.dispatch(request, false).await
    }

    async fn dispatch(&self, request: Request, scoped: bool) -> Result<Response, HttpError> {
        let mut retry_count: u32 = 0;
        loop {
            let mut attempt = request.clone();
            if scoped {
                attempt.url = format!(
                    "{}/{}",
                    self.base_url.trim_end_matches('/'),
                    attempt.url.trim_start_matches('/')
                );
                attempt
                    .headers
                    .push(("Authorization".to_string(), format!("Bearer {}", self.token)));
            }
            attempt
                .headers
                .push(("User-Agent".to_string(), self.user_agent.clone()));

            debug!(method = attempt.method.as_str(), url = %attempt.url, "send");
            let error = match self.client.execute(attempt).await {
                Ok(response) if response.status < 300 => {
                    debug!(status = response.status, "recv");
                    return Ok(response);
                }
                Ok(response) => Self::status_error(response).await,
                Err(error) => error,
            };

            if !is_transient(&error) {
                return Err(error);
            }
            if retry_count >= self.retry.max_retries {
                return Err(HttpError::RetriesExhausted {
                    attempts: retry_count + 1,
                    source: Box::new(error),
                });
            }
            let delay = retry_delay(retry_count, &self.retry);
            debug!(error = %error, delay_ms = delay.as_millis() as u64, "transient failure, backing off");
            tokio::time::sleep(delay).await;
            retry_count += 1;
        }
    }

    /// Turn a non-2xx response into an error, pulling the server's
    /// `message` field out of the body when there is one.
    async fn status_error(response: Response) -> HttpError {
        let code = response.status;
        let message = response
            .bytes()
            .await
            .ok()
            .and_then(|body| serde_json::from_slice::<serde_json::Value>(&body).ok())
            .and_then(|value| value.get("message")?.as_str().map(str::to_string));
        HttpError::Status { code, message }
    }
}

fn is_transient(error: &HttpError) -> bool {
    match error {
        HttpError::Status { code, .. } => TRANSIENT_STATUS.contains(code),
        HttpError::Transport(_) => true,
        _ => false,
    }
}
