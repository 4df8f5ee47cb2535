//! Approximate substring matching with the bitap (shift-or) algorithm.
//!
//! A pattern matches a text when some substring of the text is within
//! `floor(threshold * pattern_len)` edits of the pattern. The score is
//! `errors / pattern_len`, so 0 is perfect and anything above the threshold
//! is rejected. Where the match sits in the text does not affect the score.
//!
//! Alongside the score, the matcher reports which characters of the text it
//! considered part of the match: every scanned character that occurs in the
//! pattern, merged into inclusive `[start, end]` character ranges.
//!
//! Patterns longer than [`MAX_BITS`] are split into word-sized chunks that
//! are matched independently and whose scores are averaged.

use crate::models::MatchSpan;
use std::collections::HashMap;

/// Pattern characters that fit in one bit mask.
pub const MAX_BITS: usize = 64;

/// Floor on the score of a non-identical match, so only an exact full-text
/// match scores 0.
const MIN_SCORE: f64 = 0.001;

/// Result of matching one pattern against one text.
#[derive(Debug, Clone, PartialEq)]
pub struct BitapMatch {
    pub score: f64,
    pub spans: Vec<MatchSpan>,
}

struct Chunk {
    chars: Vec<char>,
    alphabet: HashMap<char, u64>,
    start: usize,
}

/// A lower-cased pattern compiled into bit masks.
pub struct Pattern {
    chars: Vec<char>,
    chunks: Vec<Chunk>,
    threshold: f64,
}

/// Lower-case char by char so positions keep lining up with the input text.
pub fn fold(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

impl Pattern {
    pub fn new(pattern: &str, threshold: f64) -> Self {
        let chars = fold(pattern);
        let len = chars.len();
        let mut chunks = Vec::new();

        if len <= MAX_BITS {
            if len > 0 {
                chunks.push(Chunk::new(&chars, 0));
            }
        } else {
            let remainder = len % MAX_BITS;
            let end = len - remainder;
            let mut start = 0;
            while start < end {
                chunks.push(Chunk::new(&chars[start..start + MAX_BITS], start));
                start += MAX_BITS;
            }
            if remainder > 0 {
                let start = len - MAX_BITS;
                chunks.push(Chunk::new(&chars[start..], start));
            }
        }

        Self {
            chars,
            chunks,
            threshold,
        }
    }

    /// Match against already folded text.
    pub fn search(&self, text: &[char]) -> Option<BitapMatch> {
        if self.chunks.is_empty() {
            return None;
        }

        if self.chars == text {
            let spans = if text.is_empty() {
                Vec::new()
            } else {
                vec![MatchSpan::new(0, text.len() - 1)]
            };
            return Some(BitapMatch { score: 0.0, spans });
        }

        let mut matched = false;
        let mut total = 0.0;
        let mut spans = Vec::new();

        for chunk in &self.chunks {
            let result = chunk.search(text, self.threshold);
            total += result.score;
            if result.is_match {
                matched = true;
                spans.extend(result.spans);
            }
        }

        if !matched {
            return None;
        }

        Some(BitapMatch {
            score: total / self.chunks.len() as f64,
            spans: merge_spans(spans),
        })
    }
}

struct ChunkResult {
    is_match: bool,
    score: f64,
    spans: Vec<MatchSpan>,
}

impl Chunk {
    fn new(chars: &[char], start: usize) -> Self {
        let len = chars.len();
        let mut alphabet: HashMap<char, u64> = HashMap::new();
        for (i, c) in chars.iter().enumerate() {
            *alphabet.entry(*c).or_insert(0) |= 1u64 << (len - i - 1);
        }

        Self {
            chars: chars.to_vec(),
            alphabet,
            start,
        }
    }

    fn score(&self, errors: usize) -> f64 {
        errors as f64 / self.chars.len() as f64
    }

    fn search(&self, text: &[char], threshold: f64) -> ChunkResult {
        let pattern_len = self.chars.len();
        let text_len = text.len();
        let expected = self.start.min(text_len);

        let mut threshold = threshold;
        let mut mask = vec![false; text_len];

        // Exact occurrences pin the threshold to zero errors.
        let mut from = expected;
        while let Some(index) = find(text, &self.chars, from) {
            threshold = threshold.min(self.score(0));
            mask[index..index + pattern_len].fill(true);
            from = index + pattern_len;
        }

        let finish = text_len + pattern_len;
        let top = 1u64 << (pattern_len - 1);
        let mut best_location: Option<usize> = None;
        let mut final_score = 1.0;
        let mut last_bits: Vec<u64> = vec![0; finish + 2];

        for errors in 0..pattern_len {
            let mut start = 1;
            let mut bits = vec![0u64; finish + 2];
            bits[finish + 1] = (1u64 << errors) - 1;

            let mut j = finish;
            while j >= start {
                let location = j - 1;
                let char_match = if location < text_len {
                    let m = self.alphabet.get(&text[location]).copied().unwrap_or(0);
                    mask[location] = m != 0;
                    m
                } else {
                    0
                };

                bits[j] = ((bits[j + 1] << 1) | 1) & char_match;
                if errors > 0 {
                    bits[j] |= ((last_bits[j + 1] | last_bits[j]) << 1) | 1 | last_bits[j + 1];
                }

                if bits[j] & top != 0 {
                    final_score = self.score(errors);
                    if final_score <= threshold {
                        threshold = final_score;
                        best_location = Some(location);
                        if location <= expected {
                            break;
                        }
                        start = (2 * expected).saturating_sub(location).max(1);
                    }
                }

                j -= 1;
            }

            if self.score(errors + 1) > threshold {
                break;
            }
            last_bits = bits;
        }

        let spans = mask_to_spans(&mask);
        ChunkResult {
            is_match: best_location.is_some() && !spans.is_empty(),
            score: f64::max(MIN_SCORE, final_score),
            spans,
        }
    }
}

fn find(text: &[char], pattern: &[char], from: usize) -> Option<usize> {
    if pattern.is_empty() || from >= text.len() || pattern.len() > text.len() - from {
        return None;
    }
    text[from..]
        .windows(pattern.len())
        .position(|w| w == pattern)
        .map(|i| i + from)
}

fn mask_to_spans(mask: &[bool]) -> Vec<MatchSpan> {
    let mut spans = Vec::new();
    let mut run_start = None;

    for (i, &hit) in mask.iter().enumerate() {
        match (hit, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                spans.push(MatchSpan::new(start, i - 1));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        spans.push(MatchSpan::new(start, mask.len() - 1));
    }

    spans
}

/// Sort spans and merge any that overlap or touch.
pub fn merge_spans(mut spans: Vec<MatchSpan>) -> Vec<MatchSpan> {
    spans.sort_by_key(|s| (s.start, s.end));

    let mut merged: Vec<MatchSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end + 1 => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}
