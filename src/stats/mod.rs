//! Text statistics calculator.
//!
//! Pure functions that turn a block of (possibly marked-up) text into
//! [`TextStats`]. No I/O and no hidden state, so the same input always
//! produces the same output and the calculator can run on any thread.

pub mod markup;
pub mod segmenter;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use markup::strip_markup;
pub use segmenter::count_words;

/// Default reading speed used when none (or zero) is configured.
pub const DEFAULT_WORDS_PER_MINUTE: u32 = 200;

/// A blank line: two newlines with only whitespace between them.
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph pattern"));

/// Runs of ASCII and full-width sentence terminators.
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?。！？]+").expect("valid sentence pattern"));

/// Statistics for one snapshot of text.
///
/// Serialized with camelCase keys (`charactersNoSpaces`, `readingTime`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStats {
    /// Characters after markup stripping
    pub characters: usize,
    /// Characters excluding whitespace
    pub characters_no_spaces: usize,
    /// Words, with CJK ideographs counted individually
    pub words: usize,
    /// Non-empty blocks separated by a blank line
    pub paragraphs: usize,
    /// Non-empty segments between sentence terminators
    pub sentences: usize,
    /// Newline-delimited lines (an empty text is one empty line)
    pub lines: usize,
    /// Estimated reading time in minutes, rounded up
    pub reading_time: usize,
}

impl TextStats {
    /// Stats for empty or whitespace-only text.
    ///
    /// Every count is zero except `lines`, since splitting an empty string
    /// on newlines still yields one (empty) line.
    pub const fn empty() -> Self {
        Self {
            characters: 0,
            characters_no_spaces: 0,
            words: 0,
            paragraphs: 0,
            sentences: 0,
            lines: 1,
            reading_time: 0,
        }
    }

    /// Check whether these are the stats of an empty document.
    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

impl Default for TextStats {
    fn default() -> Self {
        Self::empty()
    }
}

/// Compute statistics for `text`.
///
/// A `words_per_minute` of zero falls back to
/// [`DEFAULT_WORDS_PER_MINUTE`] instead of dividing by zero.
pub fn compute(text: &str, words_per_minute: u32) -> TextStats {
    if text.trim().is_empty() {
        return TextStats::empty();
    }

    let plain = strip_markup(text);

    let characters = plain.chars().count();
    let characters_no_spaces = plain.chars().filter(|c| !c.is_whitespace()).count();
    let lines = plain.split('\n').count();

    let paragraphs = PARAGRAPH_BREAK
        .split(&plain)
        .filter(|p| !p.trim().is_empty())
        .count();

    let sentences = SENTENCE_END
        .split(&plain)
        .filter(|s| !s.trim().is_empty())
        .count();

    let words = count_words(&plain);

    TextStats {
        characters,
        characters_no_spaces,
        words,
        paragraphs,
        sentences,
        lines,
        reading_time: reading_time(words, words_per_minute),
    }
}

/// Compute statistics for raw bytes.
///
/// Input that is not valid UTF-8 is treated as no text at all.
pub fn compute_bytes(bytes: &[u8], words_per_minute: u32) -> TextStats {
    match std::str::from_utf8(bytes) {
        Ok(text) => compute(text, words_per_minute),
        Err(e) => {
            tracing::debug!("Input is not valid UTF-8 ({}), using empty stats", e);
            TextStats::empty()
        }
    }
}

/// Compute statistics for optional text; `None` yields empty stats.
pub fn compute_opt(text: Option<&str>, words_per_minute: u32) -> TextStats {
    text.map_or_else(TextStats::empty, |t| compute(t, words_per_minute))
}

/// Minutes needed to read `words` at `words_per_minute`, rounded up.
pub fn reading_time(words: usize, words_per_minute: u32) -> usize {
    let wpm = if words_per_minute == 0 {
        DEFAULT_WORDS_PER_MINUTE
    } else {
        words_per_minute
    };
    words.div_ceil(wpm as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let stats = compute("", 200);
        assert_eq!(stats, TextStats::empty());
        assert_eq!(stats.lines, 1);
        assert_eq!(stats.words, 0);
        assert_eq!(stats.reading_time, 0);
    }

    #[test]
    fn test_whitespace_only_input() {
        assert_eq!(compute("   ", 200), TextStats::empty());
        assert_eq!(compute("\n\n\t\n", 200), TextStats::empty());
    }

    #[test]
    fn test_simple_sentence() {
        let stats = compute("Hello world.", 200);
        assert_eq!(stats.characters, 12);
        assert_eq!(stats.characters_no_spaces, 11);
        assert_eq!(stats.words, 2);
        assert_eq!(stats.sentences, 1);
        assert_eq!(stats.paragraphs, 1);
        assert_eq!(stats.lines, 1);
        assert_eq!(stats.reading_time, 1);
    }

    #[test]
    fn test_idempotent() {
        let text = "<p>Some text.</p>\n\nMore 中文 here! And more?";
        assert_eq!(compute(text, 180), compute(text, 180));
    }

    #[test]
    fn test_markup_neutrality() {
        assert_eq!(compute("<b>hi</b>", 200).words, compute("hi", 200).words);
        assert_eq!(
            compute("<p>one&nbsp;two</p>", 200).words,
            compute("one two", 200).words
        );
    }

    #[test]
    fn test_markup_counts_as_single_spaces() {
        // " hi " after stripping
        let stats = compute("<b>hi</b>", 200);
        assert_eq!(stats.characters, 4);
        assert_eq!(stats.characters_no_spaces, 2);
    }

    #[test]
    fn test_markup_only_input() {
        // Not whitespace-only before stripping, so counted after stripping
        let stats = compute("<br/>", 200);
        assert_eq!(stats.characters, 1);
        assert_eq!(stats.words, 0);
        assert_eq!(stats.sentences, 0);
        assert_eq!(stats.paragraphs, 0);
        assert_eq!(stats.lines, 1);
    }

    #[test]
    fn test_mixed_script() {
        assert_eq!(compute("我爱React", 200).words, 3);
        assert_eq!(compute("React教程 is great", 200).words, 5);
    }

    #[test]
    fn test_characters_are_scalar_values() {
        let stats = compute("我爱你", 200);
        assert_eq!(stats.characters, 3);
        assert_eq!(stats.characters_no_spaces, 3);
    }

    #[test]
    fn test_lines() {
        assert_eq!(compute("a", 200).lines, 1);
        assert_eq!(compute("a\nb", 200).lines, 2);
        assert_eq!(compute("a\nb\n", 200).lines, 3);
        assert_eq!(compute("a\n\n\nb", 200).lines, 4);
    }

    #[test]
    fn test_paragraphs() {
        assert_eq!(compute("one\ntwo", 200).paragraphs, 1);
        assert_eq!(compute("one\n\ntwo", 200).paragraphs, 2);
        assert_eq!(compute("one\n  \t\n\n two\n\nthree", 200).paragraphs, 3);
        assert_eq!(compute("\n\none\n\n", 200).paragraphs, 1);
    }

    #[test]
    fn test_sentences() {
        assert_eq!(compute("One. Two! Three?", 200).sentences, 3);
        assert_eq!(compute("Wait... what?!", 200).sentences, 2);
        assert_eq!(compute("no terminator", 200).sentences, 1);
        assert_eq!(compute("...", 200).sentences, 0);
    }

    #[test]
    fn test_full_width_terminators() {
        assert_eq!(compute("你好。再见！真的吗？", 200).sentences, 3);
    }

    #[test]
    fn test_reading_time_rounds_up() {
        assert_eq!(reading_time(0, 200), 0);
        assert_eq!(reading_time(1, 200), 1);
        assert_eq!(reading_time(200, 200), 1);
        assert_eq!(reading_time(201, 200), 2);
        assert_eq!(reading_time(450, 100), 5);
    }

    #[test]
    fn test_reading_time_zero_wpm_uses_default() {
        assert_eq!(reading_time(400, 0), 2);
        assert_eq!(compute("a b c", 0).reading_time, 1);
    }

    #[test]
    fn test_reading_time_monotonic() {
        let mut previous = 0;
        for n in 0..1000 {
            let current = reading_time(n, 230);
            assert!(current >= previous, "reading time dropped at {} words", n);
            previous = current;
        }
    }

    #[test]
    fn test_reading_time_from_text() {
        let text = "word ".repeat(401);
        let stats = compute(&text, 200);
        assert_eq!(stats.words, 401);
        assert_eq!(stats.reading_time, 3);
    }

    #[test]
    fn test_compute_bytes() {
        assert_eq!(compute_bytes(b"hello world", 200).words, 2);
        assert_eq!(compute_bytes(&[0xff, 0xfe, 0x41], 200), TextStats::empty());
    }

    #[test]
    fn test_compute_opt() {
        assert_eq!(compute_opt(None, 200), TextStats::empty());
        assert_eq!(compute_opt(Some("a b"), 200).words, 2);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(compute("Hi there.", 200)).unwrap();
        assert_eq!(json["charactersNoSpaces"], 8);
        assert_eq!(json["readingTime"], 1);
        assert_eq!(json["words"], 2);
    }

    #[test]
    fn test_default_is_empty() {
        assert!(TextStats::default().is_empty());
        assert!(!compute("x", 200).is_empty());
    }
}
