//! Rate-limited JSON transport for the remote wiki API.
//!
//! Every call goes through a single [`RateLimiter`], which keeps at least
//! `min_interval_ms` between two consecutive requests. Retry is off unless
//! `max_retries > 0`, and then only transient failures are retried with
//! exponential backoff.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::TransportConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no bearer token: authenticate before calling the API")]
    Unauthenticated,

    #[error("request to {url} failed: {message}")]
    Network {
        url: String,
        message: String,
        retryable: bool,
    },

    #[error("{url} returned HTTP {status}{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    Status {
        url: String,
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("remote API error {code}: {msg}")]
    Api { code: i64, msg: String },
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { retryable, .. } => *retryable,
            TransportError::Status { status, .. } => matches!(
                StatusCode::from_u16(*status),
                Ok(StatusCode::REQUEST_TIMEOUT
                    | StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT)
            ),
            _ => false,
        }
    }
}

/// A request relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            bearer: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// Serialises callers so that consecutive acquisitions are `min_interval` apart.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Suspends the caller until the interval since the previous call has elapsed.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Rate limit: waiting before next request");
                sleep(wait).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

/// `min(base * 2^(attempt - 1), max)` for `attempt >= 1`.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let delay = base_ms.saturating_mul(2u64.saturating_pow(exponent));
    Duration::from_millis(delay.min(max_ms))
}

pub struct Transport {
    client: Client,
    config: TransportConfig,
    limiter: RateLimiter,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| TransportError::Network {
                url: config.base_url.clone(),
                message: format!("failed to build HTTP client: {e}"),
                retryable: false,
            })?;
        let limiter = RateLimiter::new(Duration::from_millis(config.min_interval_ms));
        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    /// Sends `request`, returning the decoded JSON body of a successful call.
    pub async fn send(&self, request: &ApiRequest) -> Result<Value, TransportError> {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            request.path
        );
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;
            match self.send_once(&url, request).await {
                Err(err) if attempt < self.config.max_retries && err.is_retryable() => {
                    attempt += 1;
                    let delay = backoff_delay(
                        attempt,
                        self.config.retry_base_delay_ms,
                        self.config.retry_max_delay_ms,
                    );
                    warn!(
                        url = %url,
                        error = %err,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying remote call"
                    );
                    sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn send_once(&self, url: &str, request: &ApiRequest) -> Result<Value, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .query(&request.query);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %url, "Sending remote request");
        let response = builder.send().await.map_err(|e| network_error(url, &e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| network_error(url, &e))?;
        interpret_response(url, status, &body)
    }
}

fn network_error(url: &str, error: &reqwest::Error) -> TransportError {
    TransportError::Network {
        url: url.to_string(),
        message: error.to_string(),
        retryable: error.is_timeout() || error.is_connect(),
    }
}

/// Maps an HTTP status and body onto the response-code contract of the API:
/// a 2xx JSON body whose `code` is absent or zero.
pub fn interpret_response(url: &str, status: StatusCode, body: &str) -> Result<Value, TransportError> {
    let parsed: Result<Value, _> = serde_json::from_str(body);

    if !status.is_success() {
        let (code, message) = match &parsed {
            Ok(value) => (
                value.get("code").and_then(Value::as_i64),
                value
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or(body)
                    .to_string(),
            ),
            Err(_) => (None, body.chars().take(200).collect()),
        };
        return Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            code,
            message,
        });
    }

    let value = parsed.map_err(|e| TransportError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    match value.get("code").and_then(Value::as_i64) {
        Some(code) if code != 0 => Err(TransportError::Api {
            code,
            msg: value
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
        _ => Ok(value),
    }
}
