//! Splitting section text to fit a provider's context window.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::estimate_tokens;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("valid regex"));

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Smallest window the chunker will plan, in tokens.
pub const MIN_WINDOW_TOKENS: u32 = 64;

/// Largest accepted overlap ratio.
pub const MAX_OVERLAP_RATIO: f32 = 0.9;

/// One piece of a section's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Section index in the syllabus.
    pub section: usize,
    /// Position within the section, starting at 0.
    pub index: usize,
    /// Number of chunks in the section.
    pub total: usize,
    pub text: String,
}

/// Word-window chunker with proportional overlap.
#[derive(Debug, Clone)]
pub struct Chunker {
    window_tokens: u32,
    overlap_ratio: f32,
}

impl Chunker {
    /// Chunker for a window of `window_tokens`. The ratio is clamped to `[0, 0.9]`.
    pub fn new(window_tokens: u32, overlap_ratio: f32) -> Self {
        let ratio = if overlap_ratio.is_finite() {
            overlap_ratio.clamp(0.0, MAX_OVERLAP_RATIO)
        } else {
            0.0
        };
        Self {
            window_tokens: window_tokens.max(MIN_WINDOW_TOKENS),
            overlap_ratio: ratio,
        }
    }

    /// Window size that leaves room for the response and the fixed prompt.
    pub fn window_for(max_context_tokens: u32, response_tokens: u32, prompt_overhead_tokens: u32) -> u32 {
        max_context_tokens
            .saturating_sub(response_tokens)
            .saturating_sub(prompt_overhead_tokens)
            .max(MIN_WINDOW_TOKENS)
    }

    pub fn window_tokens(&self) -> u32 {
        self.window_tokens
    }

    pub fn overlap_ratio(&self) -> f32 {
        self.overlap_ratio
    }

    /// Split `text` into chunks. Text within budget is returned whole.
    ///
    /// Each window takes as many whole words as fit in the character budget
    /// (always at least one). The next window starts `n - floor(n * ratio)`
    /// words later, where `n` is the current window's word count.
    pub fn split(&self, section: usize, text: &str) -> Vec<Chunk> {
        let trimmed = text.trim();
        if estimate_tokens(trimmed.len()) <= self.window_tokens {
            return vec![Chunk {
                section,
                index: 0,
                total: 1,
                text: trimmed.to_string(),
            }];
        }

        let spans: Vec<(usize, usize)> = WORD.find_iter(trimmed).map(|m| (m.start(), m.end())).collect();
        let budget_chars = self.window_tokens as usize * CHARS_PER_TOKEN;

        let mut texts = Vec::new();
        let mut start = 0;
        while start < spans.len() {
            let origin = spans[start].0;
            let mut end = start + 1;
            while end < spans.len() && spans[end].1 - origin <= budget_chars {
                end += 1;
            }
            texts.push(trimmed[origin..spans[end - 1].1].to_string());
            if end == spans.len() {
                break;
            }
            let words = end - start;
            let overlap = (words as f32 * self.overlap_ratio).floor() as usize;
            start += (words - overlap).max(1);
        }

        let total = texts.len();
        tracing::debug!(section, total, window_tokens = self.window_tokens, "Planned chunks");
        texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                section,
                index,
                total,
                text,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{:03}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = Chunker::new(100, 0.2);
        let chunks = chunker.split(3, "  a few words  ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a few words");
        assert_eq!(chunks[0].section, 3);
        assert_eq!(chunks[0].total, 1);
    }

    #[test]
    fn test_overlap_is_proportional() {
        // 64-token window = 256 chars = 51 words of "wNNN " (5 chars each, last without space).
        let chunker = Chunker::new(64, 0.5);
        let text = words(200);
        let chunks = chunker.split(0, &text);
        assert!(chunks.len() > 1);

        let first: Vec<&str> = chunks[0].text.split(' ').collect();
        let second: Vec<&str> = chunks[1].text.split(' ').collect();
        let overlap = (first.len() as f32 * 0.5).floor() as usize;
        assert_eq!(&first[first.len() - overlap..], &second[..overlap]);
        assert!(chunks.iter().all(|c| c.total == chunks.len()));
        assert!(chunks.last().unwrap().text.ends_with("w199"));
    }

    #[test]
    fn test_zero_overlap_partitions_words() {
        let chunker = Chunker::new(64, 0.0);
        let text = words(300);
        let chunks = chunker.split(0, &text);
        let total_words: usize = chunks.iter().map(|c| c.text.split(' ').count()).sum();
        assert_eq!(total_words, 300);
    }

    #[test]
    fn test_ratio_is_clamped() {
        assert_eq!(Chunker::new(100, 5.0).overlap_ratio(), MAX_OVERLAP_RATIO);
        assert_eq!(Chunker::new(100, -1.0).overlap_ratio(), 0.0);
        assert_eq!(Chunker::new(100, f32::NAN).overlap_ratio(), 0.0);
        // High ratios still make progress.
        let chunks = Chunker::new(64, 0.9).split(0, &words(400));
        assert!(chunks.last().unwrap().text.ends_with("w399"));
    }

    #[test]
    fn test_window_for_budget() {
        assert_eq!(Chunker::window_for(8192, 2000, 500), 5692);
        assert_eq!(Chunker::window_for(1000, 2000, 500), MIN_WINDOW_TOKENS);
    }
}
