use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::chunker::TokenBudget;
use crate::error::{AppError, Result};
use crate::fetcher::FetchLimits;
use crate::lists::KarakeepConfig;
use crate::llm::retry::RetryPolicy;
use crate::llm::{LlmSettings, ProviderKind};
use crate::pipeline::DEFAULT_DEADLINE;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub llm: LlmSettings,
    pub budget: TokenBudget,
    pub retry: RetryPolicy,
    pub fetch: FetchLimits,
    /// Overall deadline for one summarize or send request
    pub deadline: Duration,
    /// Present only when URL, key and list name are all set
    pub karakeep: Option<KarakeepConfig>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Server
        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = parse_or(&var, "PORT", 3000)?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;
        let server_addr = SocketAddr::new(ip, port);

        // LLM provider
        let provider = match var("LLM_PROVIDER") {
            Some(name) => ProviderKind::from_str(&name).map_err(AppError::ConfigError)?,
            None => ProviderKind::Gemini,
        };
        let key_var = match provider {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = var(key_var).ok_or_else(|| AppError::ConfigError(format!("{} is not set", key_var)))?;

        let mut llm = LlmSettings::new(provider, api_key);
        if let Some(model) = var("LLM_MODEL") {
            llm.model = model;
        }
        if let Some(base_url) = var("LLM_BASE_URL") {
            llm.base_url = base_url.trim_end_matches('/').to_string();
        }
        llm.request_timeout = Duration::from_secs(parse_or(&var, "LLM_TIMEOUT_SECS", 90)?);

        let budget = TokenBudget {
            max_tokens_per_call: parse_or(&var, "LLM_MAX_TOKENS_PER_CALL", 16_000)?,
            reserved_tokens: parse_or(&var, "LLM_RESERVED_TOKENS", 2_000)?,
            ..TokenBudget::default()
        };
        budget.validate().map_err(AppError::ConfigError)?;

        let retry = RetryPolicy {
            max_attempts: parse_or(&var, "LLM_RETRY_ATTEMPTS", 3)?,
            base_delay: Duration::from_millis(parse_or(&var, "LLM_RETRY_BASE_MS", 500)?),
            max_delay: Duration::from_millis(parse_or(&var, "LLM_RETRY_MAX_MS", 8_000)?),
            ..RetryPolicy::default()
        };
        retry.validate().map_err(AppError::ConfigError)?;

        // Fetching
        let fetch = FetchLimits {
            timeout: Duration::from_secs(parse_or(&var, "FETCH_TIMEOUT_SECS", 45)?),
            max_bytes: parse_or(&var, "FETCH_MAX_BYTES", 5 * 1024 * 1024)?,
            ..FetchLimits::default()
        };
        fetch.validate().map_err(AppError::ConfigError)?;

        let deadline = Duration::from_secs(parse_or(&var, "REQUEST_DEADLINE_SECS", DEFAULT_DEADLINE.as_secs())?);
        if deadline.is_zero() {
            return Err(AppError::ConfigError("REQUEST_DEADLINE_SECS must be at least 1".to_string()));
        }

        // Karakeep
        let karakeep = match (var("KARAKEEP_API_URL"), var("KARAKEEP_API_KEY"), var("KARAKEEP_LIST_NAME")) {
            (Some(url), Some(key), Some(list)) => Some(KarakeepConfig::new(url, key, list)),
            _ => None,
        };

        Ok(Config {
            server_addr,
            llm,
            budget,
            retry,
            fetch,
            deadline,
            karakeep,
        })
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
