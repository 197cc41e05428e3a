//! URL validation and source-type classification.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use url::Url;

use crate::error::FetchError;

static VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid video id pattern"));

const YOUTUBE_HOSTS: [&str; 4] = ["youtube.com", "www.youtube.com", "m.youtube.com", "music.youtube.com"];
const YOUTUBE_SHORT_HOSTS: [&str; 2] = ["youtu.be", "www.youtu.be"];
const PATH_PREFIXES: [&str; 4] = ["embed", "v", "shorts", "live"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    WebPage,
    YouTubeVideo,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::WebPage => write!(f, "WebPage"),
            SourceKind::YouTubeVideo => write!(f, "YouTube"),
        }
    }
}

/// An absolute http(s) URL whose kind has been decided once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    url: Url,
    kind: SourceKind,
    video_id: Option<String>,
}

impl SourceUrl {
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        let input = input.trim();
        let url = Url::parse(input).map_err(|_| FetchError::InvalidUrl(input.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
            return Err(FetchError::InvalidUrl(input.to_string()));
        }

        let video_id = youtube_video_id(&url);
        let kind = if video_id.is_some() {
            SourceKind::YouTubeVideo
        } else {
            SourceKind::WebPage
        };

        Ok(Self { url, kind, video_id })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Present only for [`SourceKind::YouTubeVideo`].
    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    /// Host without a leading `www.`, used for fallback titles.
    pub fn display_host(&self) -> Option<&str> {
        self.url
            .host_str()
            .map(|host| host.strip_prefix("www.").unwrap_or(host))
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Recognises `watch?v=`, `youtu.be/<id>`, `/embed/`, `/v/`, `/shorts/` and `/live/` shapes.
pub fn youtube_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let candidate = if YOUTUBE_SHORT_HOSTS.contains(&host.as_str()) {
        segments.next().map(str::to_string)
    } else if YOUTUBE_HOSTS.contains(&host.as_str()) {
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some(prefix) if PATH_PREFIXES.contains(&prefix) => segments.next().map(str::to_string),
            _ => None,
        }
    } else {
        None
    };

    candidate.filter(|id| VIDEO_ID.is_match(id))
}
