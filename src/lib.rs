pub mod api;
pub mod assembler;
pub mod chunker;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod lists;
pub mod llm;
pub mod pipeline;
pub mod scraper;
pub mod source;
pub mod youtube;

use std::sync::Arc;

use config::Config;
use fetcher::ContentFetcher;
use lists::{KarakeepClient, ListIntegrationClient};
use llm::LlmClient;
use pipeline::{ListTarget, Summarizer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub summarizer: Arc<Summarizer>,
}

impl AppState {
    pub fn new(summarizer: Summarizer) -> Self {
        Self {
            summarizer: Arc::new(summarizer),
        }
    }

    /// Wires fetcher, LLM client and the optional list integration from `config`.
    pub fn from_config(config: &Config) -> error::Result<Self> {
        let fetcher = ContentFetcher::new(config.fetch.clone())?;
        let llm = Arc::new(LlmClient::from_settings(&config.llm, config.retry.clone(), config.budget)?);

        let mut summarizer = Summarizer::new(fetcher, llm.clone()).with_deadline(config.deadline);
        if let Some(karakeep) = &config.karakeep {
            let service = Arc::new(KarakeepClient::new(karakeep)?);
            summarizer = summarizer.with_lists(ListTarget {
                client: ListIntegrationClient::new(service, llm),
                list_name: karakeep.list_name.clone(),
            });
        }

        Ok(Self::new(summarizer))
    }
}
