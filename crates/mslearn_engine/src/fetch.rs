use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use mslearn_core::GeneratorConfig;
use mslearn_logging::{mslearn_debug, mslearn_warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::extract::RawPage;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: BROWSER_USER_AGENT.to_string(),
            accept: BROWSER_ACCEPT.to_string(),
            accept_language: "en-US,en;q=0.5".to_string(),
        }
    }
}

/// Only raised for caller mistakes; network outcomes are reported in [`FetchResult`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchContractError {
    #[error("request timeout must be a positive finite number of seconds, got {0}")]
    InvalidTimeout(f64),
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Validates a timeout given in seconds.
pub fn request_timeout(secs: f64) -> Result<Duration, FetchContractError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(FetchContractError::InvalidTimeout(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| FetchContractError::InvalidTimeout(secs))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    HttpError(u16),
    NetworkError,
    Timeout,
    /// Stop was requested before another GET could be issued.
    Cancelled,
}

/// 429 and 5xx are worth another attempt; every other non-2xx status is final.
pub fn is_transient_status(code: u16) -> bool {
    code == 429 || (500..600).contains(&code)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub url: String,
    pub final_url: Option<String>,
    pub status: FetchStatus,
    pub raw_content: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub elapsed_ms: u64,
    /// GET requests issued, including the first.
    pub attempts: u32,
    pub message: Option<String>,
}

impl FetchResult {
    pub fn is_ok(&self) -> bool {
        self.status == FetchStatus::Ok
    }

    /// The page body when the fetch succeeded.
    pub fn page(&self) -> Option<RawPage<'_>> {
        match (&self.status, &self.raw_content) {
            (FetchStatus::Ok, Some(bytes)) => Some(RawPage {
                url: &self.url,
                bytes,
                content_type: self.content_type.as_deref(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connection,
    TooLarge,
    InvalidUrl,
    Redirect,
}

impl TransportErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, TransportErrorKind::Timeout | TransportErrorKind::Connection)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One GET, no retries. Non-2xx statuses are returned as responses.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_bytes: u64,
}

impl ReqwestTransport {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchContractError> {
        let header = |value: &str| {
            HeaderValue::from_str(value).map_err(|err| FetchContractError::Client(err.to_string()))
        };
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header(&settings.user_agent)?);
        headers.insert(ACCEPT, header(&settings.accept)?);
        headers.insert(ACCEPT_LANGUAGE, header(&settings.accept_language)?);

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .default_headers(headers)
            .build()
            .map_err(|err| FetchContractError::Client(err.to_string()))?;
        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
        })
    }

    fn too_large(&self, actual: u64) -> TransportError {
        TransportError::new(
            TransportErrorKind::TooLarge,
            format!("response too large (max {}, actual {actual})", self.max_bytes),
        )
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| TransportError::new(TransportErrorKind::InvalidUrl, err.to_string()))?;

        let response = self
            .client
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if !response.status().is_success() {
            return Ok(TransportResponse {
                status,
                final_url,
                content_type,
                body: Vec::new(),
            });
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.max_bytes {
                return Err(self.too_large(content_len));
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > self.max_bytes {
                return Err(self.too_large(next_len));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(TransportResponse {
            status,
            final_url,
            content_type,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(TransportErrorKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return TransportError::new(TransportErrorKind::Redirect, err.to_string());
    }
    if err.is_builder() {
        return TransportError::new(TransportErrorKind::InvalidUrl, err.to_string());
    }
    TransportError::new(TransportErrorKind::Connection, err.to_string())
}

/// Retry budget and backoff curve for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total GET attempts per URL, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay after the `attempt`-th failed GET: `base * 2^(attempt - 1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

#[derive(Debug)]
struct PacerState {
    min_interval: Duration,
    last_slot: Option<Instant>,
}

/// Enforces a minimum gap between any two GETs that share this pacer.
#[derive(Debug)]
pub struct Pacer {
    state: Mutex<PacerState>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            state: Mutex::new(PacerState {
                min_interval,
                last_slot: None,
            }),
        }
    }

    pub fn set_min_interval(&self, min_interval: Duration) {
        self.lock().min_interval = min_interval;
    }

    pub fn min_interval(&self) -> Duration {
        self.lock().min_interval
    }

    /// Reserves the next request slot and sleeps until it arrives.
    pub async fn wait_turn(&self) {
        let wait = {
            let mut state = self.lock();
            let now = Instant::now();
            let slot = match state.last_slot {
                Some(last) => (last + state.min_interval).max(now),
                None => now,
            };
            state.last_slot = Some(slot);
            slot - now
        };
        if !wait.is_zero() {
            mslearn_debug!("pacing: waiting {} ms before next request", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PacerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

/// Transport wrapper adding retries with exponential backoff and global pacing.
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    pacer: Arc<Pacer>,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, pacer: Arc<Pacer>) -> Self {
        Self {
            transport,
            policy,
            pacer,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GETs `url`, retrying transient failures. Network outcomes never raise.
    pub async fn fetch(&self, url: &str, timeout_s: f64) -> Result<FetchResult, FetchContractError> {
        let timeout = request_timeout(timeout_s)?;
        Ok(self.fetch_with_timeout(url, timeout).await)
    }

    pub async fn fetch_with_timeout(&self, url: &str, timeout: Duration) -> FetchResult {
        self.fetch_until_cancelled(url, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`Self::fetch_with_timeout`], but gives up as soon as `cancel` fires
    /// while pacing or backing off. A GET already on the wire is never aborted.
    pub async fn fetch_until_cancelled(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> FetchResult {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        let mut last_message = None;
        loop {
            let paced = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = self.pacer.wait_turn() => true,
            };
            if !paced {
                mslearn_debug!("{url}: stopped after {attempt} attempt(s)");
                return FetchResult {
                    url: url.to_string(),
                    final_url: None,
                    status: FetchStatus::Cancelled,
                    raw_content: None,
                    content_type: None,
                    elapsed_ms: elapsed_ms(started),
                    attempts: attempt,
                    message: last_message,
                };
            }
            attempt += 1;
            mslearn_debug!("GET {url} (attempt {attempt}/{max_attempts})");
            let outcome = self.transport.get(url, timeout).await;

            let (status, message, transient) = match outcome {
                Ok(response) if (200..300).contains(&response.status) => {
                    return FetchResult {
                        url: url.to_string(),
                        final_url: Some(response.final_url),
                        status: FetchStatus::Ok,
                        raw_content: Some(response.body),
                        content_type: response.content_type,
                        elapsed_ms: elapsed_ms(started),
                        attempts: attempt,
                        message: None,
                    };
                }
                Ok(response) => (
                    FetchStatus::HttpError(response.status),
                    format!("http status {}", response.status),
                    is_transient_status(response.status),
                ),
                Err(err) => {
                    let status = match err.kind {
                        TransportErrorKind::Timeout => FetchStatus::Timeout,
                        _ => FetchStatus::NetworkError,
                    };
                    (status, err.message, err.kind.is_transient())
                }
            };

            if !transient || attempt >= max_attempts {
                if transient {
                    mslearn_warn!("{url}: giving up after {attempt} attempts: {message}");
                }
                return FetchResult {
                    url: url.to_string(),
                    final_url: None,
                    status,
                    raw_content: None,
                    content_type: None,
                    elapsed_ms: elapsed_ms(started),
                    attempts: attempt,
                    message: Some(message),
                };
            }

            let delay = self.policy.backoff(attempt);
            mslearn_warn!(
                "{url}: attempt {attempt} failed ({message}), retrying in {} ms",
                delay.as_millis()
            );
            last_message = Some(message);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(4), Duration::from_millis(4000));
        assert_eq!(policy.backoff(6), Duration::from_secs(8));
        assert_eq!(policy.backoff(40), Duration::from_secs(8));
    }

    #[test]
    fn malformed_timeouts_are_contract_errors() {
        assert_eq!(request_timeout(1.5), Ok(Duration::from_millis(1500)));
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(request_timeout(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(429));
        assert!(is_transient_status(503));
        assert!(!is_transient_status(404));
        assert!(!is_transient_status(301));
    }
}
