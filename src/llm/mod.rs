//! Provider-agnostic LLM access.
//!
//! Backends implement [`LlmBackend`]; [`LlmClient`] owns exactly one of them,
//! picked from [`LlmSettings`] at construction, and adds the token-size guard
//! and the retry policy on top.

pub mod gemini;
pub mod openai;
pub mod prompts;
pub mod retry;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::chunker::TokenBudget;
use crate::error::{AppError, LlmError};
use gemini::GeminiBackend;
use openai::OpenAiBackend;
use retry::{with_retry, RetryPolicy};

/// Title prompts only ever see the beginning of a summary.
const TITLE_INPUT_CHARS: usize = 2000;
const TITLE_MAX_WORDS: usize = 12;
const TITLE_KEEP_WORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-2.0-flash",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" | "openrouter" => Ok(ProviderKind::OpenAi),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(format!("Unknown LLM provider '{}': expected 'openai' or 'gemini'", other)),
        }
    }
}

#[derive(Clone)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Per-call timeout for summaries (default: 90s)
    pub request_timeout: Duration,
    /// Per-call timeout for titles (default: 30s)
    pub title_timeout: Duration,
    pub temperature: f32,
}

impl LlmSettings {
    pub fn new(provider: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: provider.default_model().to_string(),
            base_url: provider.default_base_url().to_string(),
            request_timeout: Duration::from_secs(90),
            title_timeout: Duration::from_secs(30),
            temperature: 0.7,
        }
    }
}

// Keeps the key out of logs.
impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("title_timeout", &self.title_timeout)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// One stateless single-turn request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// Instructions (system role for chat backends)
    pub system: String,
    /// The material to work on
    pub input: String,
    pub max_output_tokens: Option<u32>,
    pub timeout: Duration,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Submit one request and return the model's raw text.
    async fn submit(&self, request: &LlmRequest) -> Result<String, LlmError>;

    fn name(&self) -> &'static str;
}

pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
    retry: RetryPolicy,
    budget: TokenBudget,
    request_timeout: Duration,
    title_timeout: Duration,
}

impl LlmClient {
    pub fn new(backend: Arc<dyn LlmBackend>, retry: RetryPolicy, budget: TokenBudget) -> Self {
        Self {
            backend,
            retry,
            budget,
            request_timeout: Duration::from_secs(90),
            title_timeout: Duration::from_secs(30),
        }
    }

    /// Selects the backend for `settings.provider`; this is the only place the choice is made.
    pub fn from_settings(
        settings: &LlmSettings,
        retry: RetryPolicy,
        budget: TokenBudget,
    ) -> crate::error::Result<Self> {
        let http = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build LLM HTTP client: {}", e)))?;

        let backend: Arc<dyn LlmBackend> = match settings.provider {
            ProviderKind::OpenAi => Arc::new(OpenAiBackend::new(http, settings)),
            ProviderKind::Gemini => Arc::new(GeminiBackend::new(http, settings)),
        };

        Ok(Self::new(backend, retry, budget).with_timeouts(settings.request_timeout, settings.title_timeout))
    }

    pub fn with_timeouts(mut self, request_timeout: Duration, title_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.title_timeout = title_timeout;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    pub async fn summarize_chunk(&self, text: &str, role_prompt: &str) -> Result<String, LlmError> {
        let request = LlmRequest {
            system: role_prompt.to_string(),
            input: text.to_string(),
            max_output_tokens: None,
            timeout: self.request_timeout,
        };
        let output = self.call(request, "summarize").await?;
        let output = output.trim();
        if output.is_empty() {
            return Err(LlmError::MalformedResponse("model returned an empty summary".to_string()));
        }
        Ok(output.to_string())
    }

    pub async fn generate_title(&self, text: &str) -> Result<String, LlmError> {
        let input: String = text.chars().take(TITLE_INPUT_CHARS).collect();
        let request = LlmRequest {
            system: prompts::title_prompt(),
            input,
            max_output_tokens: Some(64),
            timeout: self.title_timeout,
        };
        let raw = self.call(request, "title").await?;
        clean_title(&raw).ok_or_else(|| LlmError::MalformedResponse("model returned an empty title".to_string()))
    }

    async fn call(&self, request: LlmRequest, operation: &str) -> Result<String, LlmError> {
        let estimated = self.budget.estimate_tokens(&request.system) + self.budget.estimate_tokens(&request.input);
        if estimated > self.budget.max_tokens_per_call {
            return Err(LlmError::ChunkTooLarge {
                estimated,
                limit: self.budget.max_tokens_per_call,
            });
        }

        debug!(backend = self.backend.name(), operation, estimated_tokens = estimated, "Submitting LLM request");
        with_retry(&self.retry, operation, || self.backend.submit(&request)).await
    }
}

/// First non-empty line, without quotes or a `Title:` lead-in; overly long
/// titles are cut to ten words.
pub fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = line.trim_matches(|c| matches!(c, '"' | '\'' | '*' | '#' | ' '));
    let line = match line.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("title:") => &line[6..],
        _ => line,
    };
    let title = line.trim().trim_matches(|c| matches!(c, '"' | '\'')).trim();
    if title.is_empty() {
        return None;
    }

    let words: Vec<_> = title.split_whitespace().collect();
    if words.len() > TITLE_MAX_WORDS {
        return Some(format!("{}...", words[..TITLE_KEEP_WORDS].join(" ")));
    }
    Some(words.join(" "))
}

pub(crate) fn transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::NetworkTimeout(err.to_string())
    } else if err.is_decode() {
        LlmError::MalformedResponse(err.to_string())
    } else if err.is_connect() {
        LlmError::ServerError(format!("connection failed: {}", err))
    } else {
        LlmError::ServerError(err.to_string())
    }
}

/// Maps a non-success HTTP status and body onto the error taxonomy.
pub(crate) fn status_error(status: StatusCode, body: &str) -> LlmError {
    let message = provider_message(body).unwrap_or_else(|| body.chars().take(300).collect());
    match status.as_u16() {
        429 => LlmError::RateLimited(message),
        401 | 403 => LlmError::AuthError(message),
        408 | 504 => LlmError::NetworkTimeout(message),
        code if code >= 500 => LlmError::ServerError(format!("HTTP {}: {}", code, message)),
        _ if mentions_policy(&message) => LlmError::ContentPolicyRejection(message),
        code => LlmError::InvalidRequest(format!("HTTP {}: {}", code, message)),
    }
}

fn provider_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.pointer("/error/message")
        .or_else(|| json.get("error"))
        .or_else(|| json.get("message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn mentions_policy(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["content_policy", "content policy", "safety", "content management policy"]
        .iter()
        .any(|needle| lower.contains(needle))
}
