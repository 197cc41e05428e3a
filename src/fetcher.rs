//! Bounded retrieval of page HTML and video transcripts.

use chrono::{DateTime, Utc};
use reqwest::{header, Client, ClientBuilder, Response};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AppError, FetchError, Result};
use crate::source::{SourceKind, SourceUrl};
use crate::youtube::{self, TranscriptSegment};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 SummarizerBot/1.0";

pub const YOUTUBE_BASE_URL: &str = "https://www.youtube.com/";

/// Size and time bounds applied to every fetch.
#[derive(Debug, Clone)]
pub struct FetchLimits {
    /// Total time for one request including the body (default: 45s)
    pub timeout: Duration,
    /// TCP/TLS connect time (default: 10s)
    pub connect_timeout: Duration,
    /// Largest accepted response body (default: 5 MiB)
    pub max_bytes: usize,
    /// Redirects followed before giving up (default: 5)
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(10),
            max_bytes: 5 * 1024 * 1024,
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchLimits {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.timeout.is_zero() {
            return Err("fetch timeout must be at least 1s".to_string());
        }
        if self.max_bytes < 1024 {
            return Err("fetch max_bytes must be at least 1024".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawContent {
    Html(String),
    Transcript(Vec<TranscriptSegment>),
}

#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub kind: SourceKind,
    pub raw: RawContent,
    pub byte_length: usize,
    pub fetched_at: DateTime<Utc>,
}

pub struct ContentFetcher {
    client: Client,
    limits: FetchLimits,
    youtube_base: Url,
}

impl ContentFetcher {
    pub fn new(limits: FetchLimits) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(limits.timeout)
            .connect_timeout(limits.connect_timeout)
            .user_agent(limits.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(limits.max_redirects))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let youtube_base = Url::parse(YOUTUBE_BASE_URL)
            .map_err(|e| AppError::ConfigError(format!("Invalid YouTube base URL: {}", e)))?;

        Ok(Self {
            client,
            limits,
            youtube_base,
        })
    }

    /// Points transcript lookups at another host (mirrors, fixtures).
    pub fn with_youtube_base(mut self, base: Url) -> Self {
        self.youtube_base = base;
        self
    }

    pub async fn fetch(&self, source: &SourceUrl) -> std::result::Result<FetchedContent, FetchError> {
        let started = Instant::now();

        let (raw, byte_length) = match (source.kind(), source.video_id()) {
            (SourceKind::YouTubeVideo, Some(video_id)) => {
                let (segments, bytes) = youtube::fetch_transcript(
                    &self.client,
                    &self.youtube_base,
                    video_id,
                    self.limits.max_bytes,
                )
                .await?;
                (RawContent::Transcript(segments), bytes)
            }
            _ => {
                let (html, bytes) = self.fetch_page(source.url()).await?;
                (RawContent::Html(html), bytes)
            }
        };

        info!(
            url = %source,
            kind = %source.kind(),
            bytes = byte_length,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched source content"
        );

        Ok(FetchedContent {
            kind: source.kind(),
            raw,
            byte_length,
            fetched_at: Utc::now(),
        })
    }

    /// Page HTML plus the number of bytes received on the wire.
    async fn fetch_page(&self, url: &Url) -> std::result::Result<(String, usize), FetchError> {
        let response = send_get(&self.client, url).await?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase());
        match content_type {
            Some(ref ct) if ct.contains("text/html") || ct.contains("application/xhtml+xml") => {}
            Some(ct) => {
                warn!(url = %url, content_type = %ct, "Refusing non-HTML response");
                return Err(FetchError::UnsupportedContentType(ct));
            }
            None => {
                warn!(url = %url, "Refusing response without a content type");
                return Err(FetchError::UnsupportedContentType("(none)".to_string()));
            }
        }

        let body = read_capped(response, self.limits.max_bytes, url).await?;
        let bytes = body.len();
        Ok((String::from_utf8_lossy(&body).into_owned(), bytes))
    }
}

/// GET with status checking; the body is left unread.
pub(crate) async fn send_get(client: &Client, url: &Url) -> std::result::Result<Response, FetchError> {
    debug!(url = %url, "Sending GET");
    let response = client
        .get(url.as_str())
        .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .send()
        .await
        .map_err(|e| map_request_error(e, url))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpError {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response)
}

/// Reads the body while keeping a running total; the transfer is dropped as soon as
/// `max_bytes` is crossed, so partial bodies never escape.
pub(crate) async fn read_capped(
    mut response: Response,
    max_bytes: usize,
    url: &Url,
) -> std::result::Result<Vec<u8>, FetchError> {
    if let Some(declared) = response.content_length() {
        if declared > max_bytes as u64 {
            warn!(url = %url, declared, max_bytes, "Declared body exceeds limit");
            return Err(FetchError::TooLarge { limit: max_bytes });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| map_request_error(e, url))? {
        if body.len() + chunk.len() > max_bytes {
            warn!(url = %url, max_bytes, "Streamed body exceeded limit, aborting transfer");
            return Err(FetchError::TooLarge { limit: max_bytes });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

pub(crate) fn map_request_error(err: reqwest::Error, url: &Url) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else if err.is_redirect() {
        FetchError::Unreachable(format!("{} (too many redirects)", url))
    } else {
        FetchError::Unreachable(format!("{} ({})", url, err))
    }
}
