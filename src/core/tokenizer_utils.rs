/*
 * Token estimates for the selection statistics. `CoreTikTokenCounter` uses the
 * `cl100k_base` encoding, loaded once per process; if that encoding cannot be
 * initialized every count degrades to a whitespace word count.
 */
use std::sync::OnceLock;
use tiktoken_rs::{CoreBPE, cl100k_base};

pub trait TokenCounterOperations: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn shared_bpe() -> Option<&'static CoreBPE> {
    CL100K
        .get_or_init(|| match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                log::error!(
                    "TokenCounter: Failed to initialize cl100k_base: {e:?}. Falling back to whitespace count."
                );
                None
            }
        })
        .as_ref()
}

pub struct CoreTikTokenCounter;

impl CoreTikTokenCounter {
    pub fn new() -> Self {
        CoreTikTokenCounter
    }
}

impl Default for CoreTikTokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounterOperations for CoreTikTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        match shared_bpe() {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => word_count(text),
        }
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// Whitespace-separated words, deterministic across platforms.
pub struct WordCountTokenCounter;

impl WordCountTokenCounter {
    pub fn new() -> Self {
        WordCountTokenCounter
    }
}

impl Default for WordCountTokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounterOperations for WordCountTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        word_count(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_counter() {
        let counter = WordCountTokenCounter::new();
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("  hello   world  "), 2);
        assert_eq!(counter.count_tokens("hello\tworld\r\nexample"), 3);
    }

    #[test]
    fn test_core_tiktoken_counter_empty_string() {
        let counter = CoreTikTokenCounter::new();
        assert_eq!(counter.count_tokens(""), 0);
    }

    #[test]
    fn test_core_tiktoken_counter_simple_text() {
        let counter = CoreTikTokenCounter::new();
        assert_eq!(counter.count_tokens("hello world"), 2);
        // Second call reuses the cached encoding.
        assert_eq!(counter.count_tokens("hello world"), 2);
    }
}
