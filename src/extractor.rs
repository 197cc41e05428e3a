//! Turns fetched content into plain natural-language text.

use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::fetcher::{FetchedContent, RawContent};
use crate::scraper::html_to_text;
use crate::youtube::TranscriptSegment;

/// Below this many non-whitespace characters there is nothing worth summarizing.
pub const MIN_EXTRACTED_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub plain_text: String,
    pub char_length: usize,
}

impl ExtractedText {
    pub fn as_str(&self) -> &str {
        &self.plain_text
    }
}

pub fn extract(content: FetchedContent) -> Result<ExtractedText, ExtractError> {
    let plain_text = match content.raw {
        RawContent::Html(html) => html_to_text(&html),
        RawContent::Transcript(segments) => transcript_to_text(segments),
    };

    let visible = plain_text.chars().filter(|c| !c.is_whitespace()).count();
    if visible < MIN_EXTRACTED_CHARS {
        warn!(kind = %content.kind, visible, "Extraction produced no usable text");
        return Err(ExtractError::EmptyExtraction);
    }

    let char_length = plain_text.chars().count();
    debug!(kind = %content.kind, char_length, "Extracted text");
    Ok(ExtractedText { plain_text, char_length })
}

/// One line per segment, ordered by timestamp; timing is discarded.
fn transcript_to_text(mut segments: Vec<TranscriptSegment>) -> String {
    // Stable sort keeps source order for equal timestamps.
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    segments
        .into_iter()
        .map(|segment| segment.text)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
