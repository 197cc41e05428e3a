//! End-to-end summarization: fetch → extract → chunk → map → reduce.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::assembler::{assemble, ChunkSummary, SummaryResult};
use crate::chunker::chunk;
use crate::error::{AppError, ListIntegrationError, Result};
use crate::extractor::extract;
use crate::fetcher::ContentFetcher;
use crate::llm::{prompts, LlmClient};
use crate::lists::{ListIntegrationClient, ListItemOutcome};
use crate::source::SourceUrl;

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// List integration together with the list it sends to.
pub struct ListTarget {
    pub client: ListIntegrationClient,
    pub list_name: String,
}

pub struct Summarizer {
    fetcher: ContentFetcher,
    llm: Arc<LlmClient>,
    deadline: Duration,
    lists: Option<ListTarget>,
}

impl Summarizer {
    pub fn new(fetcher: ContentFetcher, llm: Arc<LlmClient>) -> Self {
        Self {
            fetcher,
            llm,
            deadline: DEFAULT_DEADLINE,
            lists: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_lists(mut self, lists: ListTarget) -> Self {
        self.lists = Some(lists);
        self
    }

    pub fn lists_enabled(&self) -> bool {
        self.lists.is_some()
    }

    pub fn list_name(&self) -> Option<&str> {
        self.lists.as_ref().map(|l| l.list_name.as_str())
    }

    pub fn llm_backend(&self) -> &'static str {
        self.llm.backend_name()
    }

    /// Summarizes the page or video at `url` within the configured deadline.
    pub async fn summarize(&self, url: &str) -> Result<SummaryResult> {
        self.within_deadline(self.run(url)).await
    }

    /// Sends a previously produced summary to the configured list.
    pub async fn send_to_list(&self, original_url: &str, summary_markdown: &str) -> Result<ListItemOutcome> {
        let target = self.lists.as_ref().ok_or(ListIntegrationError::NotConfigured)?;
        if summary_markdown.trim().is_empty() {
            return Err(AppError::InvalidInput("summary_markdown must not be empty".to_string()));
        }
        let source = SourceUrl::parse(original_url)?;

        let summary = SummaryResult {
            original_url: source.as_str().to_string(),
            markdown_text: summary_markdown.to_string(),
            html_text: None,
            generated_at: chrono::Utc::now(),
            chunk_count: 1,
            unreduced: false,
        };
        self.within_deadline(async { Ok(target.client.send(&summary, &target.list_name).await) })
            .await
    }

    async fn within_deadline<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.deadline, work)
            .await
            .map_err(|_| AppError::DeadlineExceeded(self.deadline))?
    }

    async fn run(&self, url: &str) -> Result<SummaryResult> {
        let started = Instant::now();
        let source = SourceUrl::parse(url)?;
        info!(url = %source, kind = %source.kind(), "Summarizing");

        let content = self.fetcher.fetch(&source).await?;
        let text = extract(content)?;

        let chunks: Vec<_> = chunk(&text, self.llm.budget()).collect();
        let total = chunks.len();
        info!(url = %source, chars = text.char_length, chunks = total, "Text chunked");

        let mut summaries = Vec::with_capacity(total);
        for c in chunks {
            let prompt = if total == 1 {
                prompts::summary_prompt(source.kind(), source.as_str())
            } else {
                prompts::chunk_prompt(source.kind(), source.as_str(), c.index, total)
            };
            debug!(chunk = c.index, tokens = c.estimated_tokens, "Summarizing chunk");
            let markdown_text = self.llm.summarize_chunk(&c.text, &prompt).await?;
            summaries.push(ChunkSummary {
                chunk_index: c.index,
                markdown_text,
            });
        }

        let result = assemble(&self.llm, source.as_str(), summaries).await;
        info!(
            url = %source,
            chunks = result.chunk_count,
            unreduced = result.unreduced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Summary ready"
        );
        Ok(result)
    }
}
