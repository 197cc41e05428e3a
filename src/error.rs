use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde::Serialize;
use std::time::Duration;

use crate::api::response;

/// Coarse grouping the HTTP layer uses to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The submitted URL or its content cannot be summarized.
    ClientInput,
    /// A remote service (site, LLM provider, list service) failed.
    Upstream,
    /// Misconfiguration, bugs and timeouts.
    Internal,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Timed out fetching {0}")]
    Timeout(String),

    #[error("Response exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("HTTP {status} for {url}")]
    HttpError { status: u16, url: String },

    #[error("Could not reach {0}")]
    Unreachable(String),

    #[error("No transcript available for video {0}: transcripts may be disabled or missing")]
    NoTranscriptAvailable(String),

    #[error("Invalid URL '{0}': expected an absolute http:// or https:// address")]
    InvalidUrl(String),

    #[error("Unsupported content type '{0}': only HTML pages can be summarized")]
    UnsupportedContentType(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("No readable text could be extracted from the page")]
    EmptyExtraction,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("LLM provider rate limited the request: {0}")]
    RateLimited(String),

    #[error("LLM provider server error: {0}")]
    ServerError(String),

    #[error("LLM request timed out: {0}")]
    NetworkTimeout(String),

    #[error("LLM provider rejected the credentials: {0}")]
    AuthError(String),

    #[error("LLM provider rejected the request: {0}")]
    InvalidRequest(String),

    #[error("LLM provider refused the content: {0}")]
    ContentPolicyRejection(String),

    #[error("Chunk of ~{estimated} tokens exceeds the {limit} token limit")]
    ChunkTooLarge { estimated: usize, limit: usize },

    #[error("Unexpected response format from LLM: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Whether another attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_) | LlmError::ServerError(_) | LlmError::NetworkTimeout(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ListIntegrationError {
    #[error("ListNotFound: no list named '{0}' exists on the list service")]
    ListNotFound(String),

    #[error("ListLookupFailed: {0}")]
    ListLookupFailed(String),

    #[error("ItemCreationFailed: {0}")]
    ItemCreationFailed(String),

    #[error("List integration is not configured")]
    NotConfigured,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    ListIntegration(#[from] ListIntegrationError),

    #[error("Request did not finish within {}s", .0.as_secs())]
    DeadlineExceeded(Duration),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Fetch(err) => match err {
                FetchError::InvalidUrl(_)
                | FetchError::TooLarge { .. }
                | FetchError::NoTranscriptAvailable(_)
                | FetchError::UnsupportedContentType(_) => ErrorCategory::ClientInput,
                FetchError::HttpError { .. } | FetchError::Unreachable(_) => ErrorCategory::Upstream,
                FetchError::Timeout(_) => ErrorCategory::Internal,
            },
            AppError::Extract(_) => ErrorCategory::ClientInput,
            AppError::Llm(err) => match err {
                LlmError::AuthError(_) | LlmError::InvalidRequest(_) | LlmError::ChunkTooLarge { .. } => {
                    ErrorCategory::Internal
                }
                _ => ErrorCategory::Upstream,
            },
            AppError::ListIntegration(ListIntegrationError::NotConfigured) => ErrorCategory::Internal,
            AppError::ListIntegration(_) => ErrorCategory::Upstream,
            AppError::InvalidInput(_) => ErrorCategory::ClientInput,
            AppError::DeadlineExceeded(_) | AppError::ConfigError(_) => ErrorCategory::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        if let AppError::DeadlineExceeded(_) = self {
            return StatusCode::GATEWAY_TIMEOUT;
        }
        match self.category() {
            ErrorCategory::ClientInput => StatusCode::BAD_REQUEST,
            ErrorCategory::Upstream => StatusCode::BAD_GATEWAY,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        response::error::<()>(status, self.category(), self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
