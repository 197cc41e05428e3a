//! Token-budget-aware splitting of extracted text.
//!
//! Token counts are estimated from character counts; the reserve in
//! [`TokenBudget`] absorbs the estimation error together with the prompt
//! template and the expected output.

use serde::Serialize;

use crate::extractor::ExtractedText;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Hard per-call limit of the provider (input + output)
    pub max_tokens_per_call: usize,
    /// Held back for the prompt template and the model's answer
    pub reserved_tokens: usize,
    pub chars_per_token: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_tokens_per_call: 16_000,
            reserved_tokens: 2_000,
            chars_per_token: 4,
        }
    }
}

impl TokenBudget {
    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token.max(1))
    }

    /// Tokens a single chunk may use.
    pub fn available_tokens(&self) -> usize {
        self.max_tokens_per_call.saturating_sub(self.reserved_tokens)
    }

    /// True when `text` stays strictly under [`available_tokens`](Self::available_tokens).
    pub fn fits(&self, text: &str) -> bool {
        self.estimate_tokens(text) < self.available_tokens()
    }

    /// Largest chunk, in characters, whose estimate is still under budget.
    pub fn max_chunk_chars(&self) -> usize {
        self.available_tokens().saturating_sub(1).max(1) * self.chars_per_token.max(1)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.chars_per_token == 0 {
            return Err("chars_per_token must be at least 1".to_string());
        }
        if self.available_tokens() < 2 {
            return Err(format!(
                "reserved_tokens ({}) leaves no room under max_tokens_per_call ({})",
                self.reserved_tokens, self.max_tokens_per_call
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub estimated_tokens: usize,
}

/// Lazy chunk sequence; clone it (or call [`chunk`] again) to start over.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    pos: usize,
    index: usize,
    budget: TokenBudget,
}

pub fn chunk(text: &ExtractedText, budget: TokenBudget) -> Chunks<'_> {
    Chunks::new(text.as_str(), budget)
}

impl<'a> Chunks<'a> {
    pub fn new(text: &'a str, budget: TokenBudget) -> Self {
        Self {
            text,
            pos: 0,
            index: 0,
            budget,
        }
    }

    fn emit(&mut self, text: &str) -> Chunk {
        let chunk = Chunk {
            index: self.index,
            text: text.to_string(),
            estimated_tokens: self.budget.estimate_tokens(text),
        };
        self.index += 1;
        chunk
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.pos >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.pos..];
        if self.index == 0 && self.budget.fits(rest) {
            self.pos = self.text.len();
            return Some(self.emit(rest));
        }

        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            return None;
        }

        let window_end = trimmed
            .char_indices()
            .nth(self.budget.max_chunk_chars())
            .map_or(trimmed.len(), |(idx, _)| idx);

        if window_end == trimmed.len() {
            self.pos = self.text.len();
            return Some(self.emit(trimmed.trim_end()));
        }

        let window = &trimmed[..window_end];
        let split = split_point(window);
        self.pos += split;
        Some(self.emit(window[..split].trim_end()))
    }
}

/// Byte offset to cut `window` at: paragraph break, then sentence end, then
/// whitespace, then the window edge.
fn split_point(window: &str) -> usize {
    let half = window.len() / 2;

    if let Some(idx) = window.rfind("\n\n").filter(|&idx| idx > 0 && idx >= half) {
        return idx;
    }
    if let Some(idx) = last_sentence_end(window).filter(|&idx| idx >= half) {
        return idx;
    }
    if let Some((idx, _)) = window
        .char_indices()
        .rev()
        .find(|&(idx, c)| idx > 0 && c.is_whitespace())
    {
        return idx;
    }
    window.len()
}

fn last_sentence_end(window: &str) -> Option<usize> {
    let mut last = None;
    let mut chars = window.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        match c {
            '\n' if idx > 0 => last = Some(idx),
            '.' | '!' | '?' => {
                if chars.peek().is_some_and(|&(_, next)| next.is_whitespace()) {
                    last = Some(idx + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    last
}
