//! YouTube transcript retrieval.
//!
//! The watch page embeds a `ytInitialPlayerResponse` JSON object listing the
//! caption tracks. One track is picked by language preference and its timed
//! text document is downloaded and parsed into segments.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::FetchError;
use crate::fetcher::{read_capped, send_get};

pub const PREFERRED_LANGUAGES: [&str; 3] = ["en", "en-US", "en-GB"];

const PLAYER_RESPONSE_MARKER: &str = "ytInitialPlayerResponse";

static TEXT_NODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<text\b([^>]*)>(.*?)</text>").expect("valid text node pattern"));
static P_NODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<p\b([^>]*)>(.*?)</p>").expect("valid p node pattern"));
static ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([a-zA-Z]+)="([^"]*)""#).expect("valid attribute pattern"));
static INNER_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid entity pattern"));

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    /// Seconds from the start of the video
    pub start: f64,
    pub duration: f64,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    /// `"asr"` for auto-generated tracks
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

pub async fn fetch_transcript(
    client: &Client,
    base: &Url,
    video_id: &str,
    max_bytes: usize,
) -> Result<(Vec<TranscriptSegment>, usize), FetchError> {
    let mut watch_url = base
        .join("watch")
        .map_err(|_| FetchError::InvalidUrl(base.to_string()))?;
    watch_url.query_pairs_mut().append_pair("v", video_id);

    debug!(video_id, "Fetching watch page for caption tracks");
    let page = read_capped(send_get(client, &watch_url).await?, max_bytes, &watch_url).await?;
    let tracks = caption_tracks(&String::from_utf8_lossy(&page));

    let track = select_track(&tracks, &PREFERRED_LANGUAGES).ok_or_else(|| {
        warn!(video_id, "Video exposes no caption tracks");
        FetchError::NoTranscriptAvailable(video_id.to_string())
    })?;
    info!(
        video_id,
        language = %track.language_code,
        generated = track.is_generated(),
        available = tracks.len(),
        "Selected caption track"
    );

    let track_url = base
        .join(&track.base_url)
        .map_err(|_| FetchError::NoTranscriptAvailable(video_id.to_string()))?;
    let body = read_capped(send_get(client, &track_url).await?, max_bytes, &track_url).await?;

    let segments = parse_timed_text(&String::from_utf8_lossy(&body));
    if segments.is_empty() {
        warn!(video_id, "Caption track is empty");
        return Err(FetchError::NoTranscriptAvailable(video_id.to_string()));
    }

    Ok((segments, body.len()))
}

/// Caption tracks listed in the watch page, in page order.
pub fn caption_tracks(html: &str) -> Vec<CaptionTrack> {
    player_response(html)
        .and_then(|player| {
            player
                .pointer("/captions/playerCaptionsRenderer/captionTracks")
                .cloned()
        })
        .and_then(|tracks| serde_json::from_value(tracks).ok())
        .unwrap_or_default()
}

fn player_response(html: &str) -> Option<Value> {
    html.match_indices(PLAYER_RESPONSE_MARKER).find_map(|(idx, marker)| {
        let rest = html[idx + marker.len()..].trim_start_matches(['"', ']', ' ']);
        let rest = rest.strip_prefix('=')?.trim_start();
        if !rest.starts_with('{') {
            return None;
        }
        serde_json::Deserializer::from_str(rest)
            .into_iter::<Value>()
            .next()?
            .ok()
    })
}

/// Manual track in a preferred language, then a generated one, then anything.
pub fn select_track<'a>(tracks: &'a [CaptionTrack], preferred: &[&str]) -> Option<&'a CaptionTrack> {
    let preferred_track = |generated: bool| {
        preferred.iter().find_map(|lang| {
            tracks
                .iter()
                .find(|track| track.language_code == *lang && track.is_generated() == generated)
        })
    };

    preferred_track(false)
        .or_else(|| preferred_track(true))
        .or_else(|| tracks.first())
}

/// Parses both the legacy `<text start dur>` format (seconds) and the
/// `srv3` `<p t d>` format (milliseconds).
pub fn parse_timed_text(xml: &str) -> Vec<TranscriptSegment> {
    let legacy: Vec<_> = TEXT_NODE
        .captures_iter(xml)
        .filter_map(|caps| segment(&caps, "start", "dur", 1.0))
        .collect();
    if !legacy.is_empty() {
        return legacy;
    }

    P_NODE
        .captures_iter(xml)
        .filter_map(|caps| segment(&caps, "t", "d", 1000.0))
        .collect()
}

fn segment(caps: &Captures<'_>, start_attr: &str, dur_attr: &str, scale: f64) -> Option<TranscriptSegment> {
    let attrs = caps.get(1).map_or("", |m| m.as_str());
    let attr = |name: &str| {
        ATTRIBUTE
            .captures_iter(attrs)
            .find(|a| &a[1] == name)
            .and_then(|a| a[2].parse::<f64>().ok())
    };

    let raw = caps.get(2).map_or("", |m| m.as_str());
    // Entities are frequently double-encoded (`&amp;#39;`).
    let text = decode_entities(&decode_entities(&INNER_TAG.replace_all(raw, "")));
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }

    Some(TranscriptSegment {
        start: attr(start_attr).unwrap_or(0.0) / scale,
        duration: attr(dur_attr).unwrap_or(0.0) / scale,
        text,
    })
}

pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") => u32::from_str_radix(&entity[2..], 16)
                    .ok()
                    .and_then(char::from_u32),
                _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
