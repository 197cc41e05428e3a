#![allow(dead_code)]

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use url_summarizer::chunker::TokenBudget;
use url_summarizer::fetcher::{ContentFetcher, FetchLimits};
use url_summarizer::llm::retry::RetryPolicy;
use url_summarizer::llm::{LlmClient, LlmSettings, ProviderKind};
use url_summarizer::pipeline::Summarizer;

pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fixture server");
    });
    addr
}

/// Chat-completions endpoint that records request bodies and answers
/// `## Summary N` for the N-th call (0-based).
#[derive(Clone, Default)]
pub struct FakeLlm {
    pub requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeLlm {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn system_prompt(&self, call: usize) -> String {
        self.requests.lock().unwrap()[call]["messages"][0]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    pub fn user_input(&self, call: usize) -> String {
        self.requests.lock().unwrap()[call]["messages"][1]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    pub async fn start(&self) -> SocketAddr {
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(|State(llm): State<FakeLlm>, Json(body): Json<Value>| async move {
                    let n = {
                        let mut requests = llm.requests.lock().unwrap();
                        requests.push(body);
                        requests.len() - 1
                    };
                    Json(json!({
                        "choices": [{
                            "message": {"role": "assistant", "content": format!("## Summary {}\n\n- point", n)},
                            "finish_reason": "stop"
                        }]
                    }))
                }),
            )
            .with_state(self.clone());
        serve(app).await
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: false,
        ..RetryPolicy::default()
    }
}

pub fn llm_client(llm_addr: SocketAddr, budget: TokenBudget) -> Arc<LlmClient> {
    let mut settings = LlmSettings::new(ProviderKind::OpenAi, "sk-test");
    settings.base_url = format!("http://{}/v1", llm_addr);
    settings.request_timeout = Duration::from_secs(5);
    Arc::new(LlmClient::from_settings(&settings, fast_retry(), budget).unwrap())
}

pub fn fetcher(max_bytes: usize, youtube_base: Option<SocketAddr>) -> ContentFetcher {
    let limits = FetchLimits {
        timeout: Duration::from_secs(5),
        max_bytes,
        ..FetchLimits::default()
    };
    let fetcher = ContentFetcher::new(limits).unwrap();
    match youtube_base {
        Some(addr) => fetcher.with_youtube_base(Url::parse(&format!("http://{}/", addr)).unwrap()),
        None => fetcher,
    }
}

pub fn summarizer(llm_addr: SocketAddr, budget: TokenBudget, youtube_base: Option<SocketAddr>) -> Summarizer {
    Summarizer::new(fetcher(1024 * 1024, youtube_base), llm_client(llm_addr, budget))
}

/// `<article>` page with one `<p>` per paragraph.
pub fn article_page(paragraphs: &[String]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{}</p>\n", p)).collect();
    format!(
        "<html><head><title>Fixture</title><script>var tracking = 1;</script></head>\
         <body><nav>Home | About</nav><article>{}</article><footer>Copyright</footer></body></html>",
        body
    )
}

/// `words` words of prose, split into sentences of ten words.
pub fn prose(words: usize, tag: &str) -> String {
    let mut out = String::new();
    for i in 0..words {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{}{}", tag, i));
        if i % 10 == 9 {
            out.push('.');
        }
    }
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}
