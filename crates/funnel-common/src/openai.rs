/// Minimal client for OpenAI-compatible chat completion endpoints.
///
/// Only non-streaming completions are supported. Timeouts, connection errors,
/// 429 and 5xx responses are retried with capped exponential backoff.

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: RetryBackoff,
    /// Upper bound on how much of an error response body is kept.
    pub error_body_limit: usize,
}

impl Default for OpenAiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: RetryBackoff::default(),
            error_body_limit: 8 * 1024,
        }
    }
}

impl OpenAiClientConfig {
    /// Reads `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_TIMEOUT_SECS`,
    /// `OPENAI_MAX_RETRIES`, `OPENAI_RETRY_INITIAL_MS`, `OPENAI_RETRY_MAX_MS`
    /// and `OPENAI_MAX_ERROR_BODY_BYTES`. Unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |key: &str| text(key).and_then(|v| v.parse::<u64>().ok());

        Self {
            base_url: text("OPENAI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: text("OPENAI_API_KEY"),
            timeout: number("OPENAI_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: parse_or(text("OPENAI_MAX_RETRIES"), defaults.max_retries),
            backoff: RetryBackoff {
                initial: number("OPENAI_RETRY_INITIAL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.backoff.initial),
                cap: number("OPENAI_RETRY_MAX_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.backoff.cap),
            },
            error_body_limit: parse_or(
                text("OPENAI_MAX_ERROR_BODY_BYTES"),
                defaults.error_body_limit,
            ),
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Exponential backoff doubling from `initial`, capped at `cap`, plus up to
/// 25% jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBackoff {
    pub initial: Duration,
    pub cap: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            cap: Duration::from_secs(5),
        }
    }
}

impl RetryBackoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        let base = self.initial.saturating_mul(factor).min(self.cap);
        let spread = (base.as_millis() as u64 / 4).max(1);
        base + Duration::from_millis(clock_jitter(spread))
    }
}

fn clock_jitter(max_inclusive: u64) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    nanos % (max_inclusive + 1)
}

#[derive(Debug, thiserror::Error)]
pub enum OpenAiClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed completion response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("completion API returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("completion contained no message content")]
    EmptyCompletion,
}

impl OpenAiClientError {
    /// Worth another attempt: network trouble, throttling, or a server-side failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Decode(_) | Self::EmptyCompletion => false,
        }
    }

    /// Builds an `Api` error, preferring the `error.message` field of a JSON body.
    fn from_body(status: StatusCode, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.error.message)
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
        Self::Api { status, message }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiClientConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, OpenAiClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("funnel-common/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }

    /// Run a chat completion and return the first choice's text.
    pub async fn complete_text(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<String, OpenAiClientError> {
        let mut retry = 0;
        let response = loop {
            match self.send(&request).await {
                Ok(response) => break response,
                Err(e) if retry < self.config.max_retries && e.is_transient() => {
                    let delay = self.config.backoff.delay(retry);
                    retry += 1;
                    warn!(
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "chat completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        if let Some(usage) = &response.usage {
            debug!(
                model = %request.model,
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                "chat completion usage"
            );
        }
        response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(OpenAiClientError::EmptyCompletion)
    }

    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, OpenAiClientError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut builder = self.http.post(url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        let mut body = resp.bytes().await?;
        if !status.is_success() {
            body.truncate(self.config.error_body_limit);
            return Err(OpenAiClientError::from_body(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// The subset of the completion response the client reads.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}
