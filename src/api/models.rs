use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assembler::SummaryResult;

#[derive(Deserialize)]
pub struct SummarizeRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct SummarizeResponse {
    pub original_url: String,
    pub summary_markdown: String,
    pub summary_html: String,
    pub generated_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub unreduced: bool,
}

impl From<SummaryResult> for SummarizeResponse {
    fn from(result: SummaryResult) -> Self {
        let summary_html = result
            .html_text
            .unwrap_or_else(|| super::response::markdown_to_html(&result.markdown_text));
        Self {
            original_url: result.original_url,
            summary_markdown: result.markdown_text,
            summary_html,
            generated_at: result.generated_at,
            chunk_count: result.chunk_count,
            unreduced: result.unreduced,
        }
    }
}

/// The summary travels back from the client; nothing is kept server-side.
#[derive(Deserialize)]
pub struct SendToListRequest {
    pub original_url: String,
    pub summary_markdown: String,
}

#[derive(Serialize)]
pub struct SendToListResponse {
    pub list: String,
    pub item_id: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub llm_backend: &'static str,
    pub lists_enabled: bool,
}
