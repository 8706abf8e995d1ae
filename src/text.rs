//! Text quality filtering for review/comment candidates.
//!
//! The sentiment model is English-only, so anything that does not look like
//! English prose is dropped before scoring. Both functions are pure and total.

/// Heuristic language check: Latin-letter ratio >= 0.30 and non-ASCII ratio
/// <= 0.20, measured over the character count. Empty text never qualifies.
pub fn is_likely_english(text: &str) -> bool {
    let mut total = 0usize;
    let mut letters = 0usize;
    let mut non_ascii = 0usize;

    for c in text.chars() {
        total += 1;
        if c.is_ascii_alphabetic() {
            letters += 1;
        }
        if !c.is_ascii() {
            non_ascii += 1;
        }
    }

    if total == 0 {
        return false;
    }

    let letter_ratio = letters as f64 / total as f64;
    let non_ascii_ratio = non_ascii as f64 / total as f64;
    letter_ratio >= 0.3 && non_ascii_ratio <= 0.2
}

/// Truncate to at most `max_chars` characters (not bytes, so multi-byte
/// content is never split mid-character).
pub fn trim_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
