//! Approximate token estimation.
//!
//! Real tokenizers differ per model, so these numbers are only estimates. They
//! are deterministic and never decrease when text grows, which is all the
//! history trimmer relies on.

use crate::Role;

/// Estimate tokens in `text`.
///
/// CJK characters count as roughly 2 per token, ASCII as 4 per token and
/// everything else as 3 per token. Non-empty text is at least one token.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let (cjk, ascii, other) = count_character_types(text);

    // Work in twelfths to stay in integers: 1/2 = 6/12, 1/4 = 3/12, 1/3 = 4/12.
    let twelfths = cjk * 6 + ascii * 3 + other * 4;
    twelfths.div_ceil(12).max(1)
}

/// Fixed per-message cost of the role and framing.
#[must_use]
pub const fn role_overhead(role: Role) -> usize {
    match role {
        Role::System => 4,
        Role::Human => 3,
        Role::Assistant => 5,
    }
}

fn count_character_types(text: &str) -> (usize, usize, usize) {
    let mut cjk = 0;
    let mut ascii = 0;
    let mut other = 0;

    for c in text.chars() {
        if c.is_ascii() {
            ascii += 1;
        } else if is_cjk(c) {
            cjk += 1;
        } else {
            other += 1;
        }
    }

    (cjk, ascii, other)
}

const fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF      // CJK Unified Ideographs
            | 0x3400..=0x4DBF  // Extension A
            | 0x3040..=0x30FF  // Hiragana, Katakana
            | 0xAC00..=0xD7AF  // Hangul syllables
            | 0xF900..=0xFAFF  // Compatibility ideographs
            | 0x20000..=0x2A6DF
    )
}
