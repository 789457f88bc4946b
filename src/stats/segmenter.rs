//! Mixed-script word counting.
//!
//! CJK ideographs carry roughly one word of meaning each, while Latin-script
//! text is counted per whitespace-separated token. A token mixing both
//! (`React教程`) counts each ideograph plus one for the Latin remainder.

/// CJK Unified Ideographs block.
const CJK_START: char = '\u{4E00}';
const CJK_END: char = '\u{9FFF}';

/// Check whether a character is a CJK unified ideograph.
#[inline]
pub fn is_cjk(c: char) -> bool {
    (CJK_START..=CJK_END).contains(&c)
}

/// Count words in a single whitespace-free token.
///
/// Returns the number of CJK characters, plus one if anything else remains.
pub fn token_words(token: &str) -> usize {
    let mut cjk = 0;
    let mut has_other = false;

    for c in token.chars() {
        if is_cjk(c) {
            cjk += 1;
        } else if !c.is_whitespace() {
            has_other = true;
        }
    }

    cjk + usize::from(has_other)
}

/// Count words across a whole text.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().map(token_words).sum()
}
