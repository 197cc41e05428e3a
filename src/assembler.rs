//! Combines per-chunk summaries into the final result.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::chunker::Chunks;
use crate::error::LlmError;
use crate::llm::{prompts, LlmClient};

const PART_SEPARATOR: &str = "\n\n---\n\n";

/// Prepended when the chunk summaries could not be merged.
pub const UNREDUCED_NOTE: &str =
    "> **Note:** the section summaries below could not be merged automatically and are shown in document order.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub chunk_index: usize,
    pub markdown_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResult {
    pub original_url: String,
    pub markdown_text: String,
    /// Filled in by the presentation layer.
    pub html_text: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub chunk_count: usize,
    /// True when chunk summaries are returned concatenated instead of merged.
    pub unreduced: bool,
}

/// Never fails: a failed reduction falls back to the concatenated chunk summaries.
pub async fn assemble(llm: &LlmClient, url: &str, mut summaries: Vec<ChunkSummary>) -> SummaryResult {
    summaries.sort_by_key(|s| s.chunk_index);
    let chunk_count = summaries.len();

    let (markdown_text, unreduced) = if chunk_count == 1 {
        (summaries.remove(0).markdown_text, false)
    } else {
        let joined = summaries
            .iter()
            .map(|s| s.markdown_text.as_str())
            .collect::<Vec<_>>()
            .join(PART_SEPARATOR);

        match reduce(llm, url, &joined).await {
            Ok(merged) => (merged, false),
            Err(err) => {
                warn!(url, chunk_count, error = %err, "Reduce step failed, returning chunk summaries unmerged");
                (format!("{}\n\n{}", UNREDUCED_NOTE, joined), true)
            }
        }
    };

    SummaryResult {
        original_url: url.to_string(),
        markdown_text,
        html_text: None,
        generated_at: Utc::now(),
        chunk_count,
        unreduced,
    }
}

/// One reduce call, or one level of partial reductions followed by a final one.
async fn reduce(llm: &LlmClient, url: &str, joined: &str) -> Result<String, LlmError> {
    let budget = llm.budget();
    let prompt = prompts::reduce_prompt(url);

    if budget.fits(joined) {
        return llm.summarize_chunk(joined, &prompt).await;
    }

    let mut partials = Vec::new();
    for piece in Chunks::new(joined, budget) {
        partials.push(llm.summarize_chunk(&piece.text, &prompt).await?);
    }
    info!(url, pieces = partials.len(), "Chunk summaries exceeded the budget, reduced in pieces");

    let combined = partials.join(PART_SEPARATOR);
    if !budget.fits(&combined) {
        return Err(LlmError::ChunkTooLarge {
            estimated: budget.estimate_tokens(&combined),
            limit: budget.available_tokens(),
        });
    }
    llm.summarize_chunk(&combined, &prompt).await
}
