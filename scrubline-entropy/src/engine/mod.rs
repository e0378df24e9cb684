//! The token-level entropy engine.
//!
//! Text is split into credential-shaped tokens (ASCII alphanumerics plus
//! `+`, `_` and `-`, with trailing `=` padding). A token is a candidate when it
//! is long enough and mixes upper-case, lower-case and digits, which rules out
//! words, hex digests and UUIDs. Candidates are scored on Shannon entropy with
//! a bonus for a preceding credential keyword.

use alloc::vec::Vec;

use daachorse::errors::DaachorseError;

use crate::context::ContextScanner;
use crate::entropy::calculate_shannon_entropy;
use crate::scoring::{calculate_confidence, ScoringWeights};

/// Represents a high-entropy token found in text. Offsets are byte offsets and
/// always fall on ASCII boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyMatch {
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    pub entropy: f64,
}

/// Detection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyConfig {
    /// Shortest token considered.
    pub min_token_len: usize,
    /// Entropy (bits per byte) at which a token scores a confidence of 1.0.
    pub entropy_threshold: f64,
    /// How many bytes before a token are searched for credential keywords.
    pub context_window: usize,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            min_token_len: 20,
            entropy_threshold: 4.0,
            context_window: 32,
        }
    }
}

#[derive(Debug)]
pub struct EntropyEngine {
    config: EntropyConfig,
    context_scanner: ContextScanner,
    scoring_weights: ScoringWeights,
}

impl EntropyEngine {
    pub fn new(config: EntropyConfig) -> Result<Self, DaachorseError> {
        Ok(Self {
            config,
            context_scanner: ContextScanner::new()?,
            scoring_weights: ScoringWeights::default(),
        })
    }

    /// Scans `text` and returns every token that scores as a secret, in order.
    pub fn scan(&self, text: &[u8]) -> Vec<EntropyMatch> {
        let mut matches = Vec::new();
        for (start, end) in tokenize(text) {
            let token = &text[start..end];
            if !self.is_candidate(token) {
                continue;
            }

            let entropy = calculate_shannon_entropy(token);
            let has_context = self
                .context_scanner
                .scan_preceding_context(text, start, self.config.context_window);
            let confidence = calculate_confidence(
                entropy,
                self.config.entropy_threshold,
                has_context,
                &self.scoring_weights,
            );

            if confidence >= 1.0 {
                matches.push(EntropyMatch { start, end, confidence, entropy });
            }
        }
        matches
    }

    fn is_candidate(&self, token: &[u8]) -> bool {
        if token.len() < self.config.min_token_len {
            return false;
        }
        let has_upper = token.iter().any(u8::is_ascii_uppercase);
        let has_lower = token.iter().any(u8::is_ascii_lowercase);
        let has_digit = token.iter().any(u8::is_ascii_digit);
        has_upper && has_lower && has_digit
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'_' | b'-')
}

/// Splits `text` into `(start, end)` spans of token bytes. Trailing `=` is kept
/// as base64 padding.
fn tokenize(text: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut i = 0;
    while i < text.len() {
        if !is_token_byte(text[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < text.len() && is_token_byte(text[i]) {
            i += 1;
        }
        let mut pad_end = i;
        while pad_end < text.len() && text[pad_end] == b'=' {
            pad_end += 1;
        }
        // `key=value` is a separator, not padding
        if pad_end == text.len() || !is_token_byte(text[pad_end]) {
            i = pad_end;
        }
        spans.push((start, i));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EntropyEngine {
        EntropyEngine::new(EntropyConfig::default()).unwrap()
    }

    #[test]
    fn test_random_token_is_detected() {
        let text = b"deploy with Zq8vR2mXw4Tn7LpK3sYb9HcF now";
        let matches = engine().scan(text);
        assert_eq!(matches.len(), 1);
        assert_eq!(&text[matches[0].start..matches[0].end], b"Zq8vR2mXw4Tn7LpK3sYb9HcF");
    }

    #[test]
    fn test_plain_sentence_is_ignored() {
        let text = b"This is a perfectly ordinary sentence about refactoring the parser.";
        assert!(engine().scan(text).is_empty());
    }

    #[test]
    fn test_hex_digest_is_ignored() {
        let text = b"commit 3f9a1c0b7e2d4f6a8b9c0d1e2f3a4b5c6d7e8f90";
        assert!(engine().scan(text).is_empty());
    }

    #[test]
    fn test_padding_is_part_of_token() {
        let spans = tokenize(b"x=QUJDRA== y");
        assert_eq!(spans, alloc::vec![(0, 1), (2, 10), (11, 12)]);
        let spans = tokenize(b"key=value");
        assert_eq!(spans, alloc::vec![(0, 3), (4, 9)]);
    }

    #[test]
    fn test_keyword_context_tips_borderline_token() {
        // 12 distinct symbols, each twice: log2(12) ~= 3.58 bits
        let bare = b"value Ab1Cd2Ef3Gh4Ab1Cd2Ef3Gh4";
        let labelled = b"secret: Ab1Cd2Ef3Gh4Ab1Cd2Ef3Gh4";
        assert!(engine().scan(bare).is_empty());
        assert_eq!(engine().scan(labelled).len(), 1);
    }

    #[test]
    fn test_low_entropy_token_is_ignored() {
        let text = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaA1";
        assert!(engine().scan(text).is_empty());
    }
}
