//! Text helpers for previews, keyword scoring and passage chunking

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
    static ref WORD_REGEX: Regex = Regex::new(r"[A-Za-z0-9]+").unwrap();
}

pub struct TextUtils;

impl TextUtils {
    /// Collapse runs of whitespace into single spaces
    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        if WHITESPACE_REGEX.is_match(text) {
            Cow::Owned(WHITESPACE_REGEX.replace_all(text, " ").trim().to_string())
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Truncate to at most `max_chars` characters, ending with `...` when cut.
    pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> Cow<'_, str> {
        if text.chars().count() <= max_chars {
            Cow::Borrowed(text)
        } else if max_chars <= 3 {
            Cow::Borrowed("...")
        } else {
            let mut result: String = text.chars().take(max_chars - 3).collect();
            result.push_str("...");
            Cow::Owned(result)
        }
    }

    /// Check if word is significant (not stop word, long enough)
    pub fn is_significant_word(word: &str, min_len: usize) -> bool {
        if word.len() < min_len {
            return false;
        }

        !matches!(word.to_lowercase().as_str(), "the" | "a" | "an" | "and" | "or" | "but" | "in" | "on" | "at" | "to" | "for" |
            "of" | "with" | "by" | "is" | "am" | "are" | "was" | "were" | "be" | "been" |
            "being" | "have" | "has" | "had" | "do" | "does" | "did")
    }

    /// Lowercased significant words of `text`, deduplicated in first-seen order.
    pub fn keywords(text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in WORD_REGEX.find_iter(text) {
            let word = m.as_str().to_lowercase();
            if Self::is_significant_word(&word, 3) && !out.contains(&word) {
                out.push(word);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(TextUtils::truncate_with_ellipsis("short", 60), "short");
        assert_eq!(TextUtils::truncate_with_ellipsis("abcdefghij", 6), "abc...");
        assert_eq!(TextUtils::truncate_with_ellipsis("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_keywords_skip_stop_words() {
        assert_eq!(
            TextUtils::keywords("What are the fees for Block 3? fees!"),
            vec!["what", "fees", "block"]
        );
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(TextUtils::normalize_whitespace("  a \n\t b  "), "a b");
    }
}
