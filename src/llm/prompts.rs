//! Instruction texts sent with each kind of LLM call.

use crate::source::SourceKind;

const WEB_INSTRUCTIONS: &str = "\
Aim to cover the topic thoroughly by exploring various aspects and perspectives.

Response structure:
- Expand the story thoroughly and quote short snippets from the page where they help.
- Provide detailed coverage, including multiple perspectives where the page offers them.
- Use clear Markdown headings and bullet points.
- Finish with the key takeaways.";

const YOUTUBE_INSTRUCTIONS: &str = "\
Identify the key themes and arguments of the video and give a comprehensive overview.

Response structure:
- Use bullet points where helpful, especially for arguments, steps or differing viewpoints.
- Use bold text for emphasis and make every sub-heading stand out.
- Use clear and concise language and present the points in a logical order.";

/// Full summary of a source that fits into a single call.
pub fn summary_prompt(kind: SourceKind, url: &str) -> String {
    match kind {
        SourceKind::WebPage => format!(
            "You summarize web pages. Summarize the page at {} from the content provided.\n\n{}",
            url, WEB_INSTRUCTIONS
        ),
        SourceKind::YouTubeVideo => format!(
            "You write detailed summaries of YouTube videos from their transcripts. \
             Summarize the video at {} from the transcript provided.\n\n{}",
            url, YOUTUBE_INSTRUCTIONS
        ),
    }
}

/// Summary of one part of a source that was split into `total` parts.
pub fn chunk_prompt(kind: SourceKind, url: &str, index: usize, total: usize) -> String {
    let material = match kind {
        SourceKind::WebPage => "page",
        SourceKind::YouTubeVideo => "video transcript",
    };
    format!(
        "{}\n\nThe content was too long for one pass. You are given part {} of {} of the {}. \
         Summarize only this part; its summary will be merged with the others afterwards, \
         so do not add an introduction or a conclusion for the whole source.",
        summary_prompt(kind, url),
        index + 1,
        total,
        material
    )
}

/// Merge of partial summaries, given in document order, into one.
pub fn reduce_prompt(url: &str) -> String {
    format!(
        "You merge partial summaries into one document. The content below holds summaries of \
         consecutive parts of {}, in order. Combine them into a single coherent Markdown summary. \
         Remove repetition but keep every distinct key point, use clear headings and bullet points \
         and finish with the key takeaways. Do not mention that the input was split.",
        url
    )
}

pub fn title_prompt() -> String {
    "Summarize the following text into a concise title of less than 10 words. \
     Output only the title itself, without any introductory phrase like \"Title:\"."
        .to_string()
}
