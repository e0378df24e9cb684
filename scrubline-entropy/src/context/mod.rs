// scrubline-entropy/src/context/mod.rs
use core::fmt;

use daachorse::errors::DaachorseError;
use daachorse::DoubleArrayAhoCorasick;

/// Keywords that commonly label a credential in logs, configs and shell output.
pub const CREDENTIAL_KEYWORDS: &[&str] = &[
    "key", "api", "apikey", "token", "secret", "password", "passwd", "pwd", "auth",
    "bearer", "credential", "private", "client", "session", "cookie", "signature",
];

/// Detects credential keywords immediately before a candidate token.
pub struct ContextScanner {
    automaton: DoubleArrayAhoCorasick<usize>,
}

impl fmt::Debug for ContextScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextScanner")
            .field("automaton", &"<DoubleArrayAhoCorasick>")
            .finish()
    }
}

impl ContextScanner {
    /// Builds a scanner over [`CREDENTIAL_KEYWORDS`].
    pub fn new() -> Result<Self, DaachorseError> {
        Self::with_keywords(CREDENTIAL_KEYWORDS)
    }

    /// Builds a scanner over a caller-supplied keyword list.
    pub fn with_keywords(keywords: &[&str]) -> Result<Self, DaachorseError> {
        let automaton = DoubleArrayAhoCorasick::new(keywords.iter().copied())?;
        Ok(Self { automaton })
    }

    /// Returns true when a keyword appears as a whole word within `window_size`
    /// bytes before `token_start`. Matching is ASCII case-insensitive.
    pub fn scan_preceding_context(&self, text: &[u8], token_start: usize, window_size: usize) -> bool {
        if token_start == 0 || token_start > text.len() {
            return false;
        }

        let start = token_start.saturating_sub(window_size);
        let mut window = alloc::vec::Vec::with_capacity(token_start - start);
        window.extend(text[start..token_start].iter().map(u8::to_ascii_lowercase));

        for matched in self.automaton.find_overlapping_iter(&window) {
            let m_start = matched.start();
            let m_end = matched.end();

            // "key" must not match inside "monkey"
            let prefix_ok = m_start == 0 || !window[m_start - 1].is_ascii_alphabetic();
            let suffix_ok = m_end == window.len() || !window[m_end].is_ascii_alphabetic();

            if prefix_ok && suffix_ok {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_before_token() {
        let scanner = ContextScanner::new().unwrap();
        let text = b"export API_KEY=abc123";
        let token_start = text.len() - 6;
        assert!(scanner.scan_preceding_context(text, token_start, 32));
    }

    #[test]
    fn test_keyword_inside_word_is_ignored() {
        let scanner = ContextScanner::new().unwrap();
        let text = b"the monkey ate abc123";
        let token_start = text.len() - 6;
        assert!(!scanner.scan_preceding_context(text, token_start, 32));
    }

    #[test]
    fn test_token_at_start_has_no_context() {
        let scanner = ContextScanner::new().unwrap();
        assert!(!scanner.scan_preceding_context(b"abc123", 0, 32));
    }
}
