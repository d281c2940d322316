//! Shannon entropy of candidate leak lines.
//!
//! Used by the leak analyzer to discard pattern matches that are too
//! uniform to be real secrets (e.g. `password=password`).

use std::collections::HashMap;

/// Shannon entropy of `data` in bits per character: `−Σ pᵢ·log₂(pᵢ)` over
/// character frequencies. The empty string and single-character strings
/// have entropy 0.
#[must_use]
pub fn shannon_entropy(data: &str) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<char, u32> = HashMap::new();
    let mut total = 0u32;
    for ch in data.chars() {
        *counts.entry(ch).or_insert(0) += 1;
        total += 1;
    }
    let inv_len = 1.0 / f64::from(total);
    let mut entropy = 0.0;
    for count in counts.values() {
        let freq = f64::from(*count) * inv_len;
        entropy -= freq * freq.log2();
    }
    entropy
}

/// Maximum [`shannon_entropy`] over the whitespace-separated words of
/// `data`. Returns 0 for strings with no words.
#[must_use]
pub fn word_shannon_entropy(data: &str) -> f64 {
    data.split_whitespace()
        .map(shannon_entropy)
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_has_zero_entropy() {
        assert_eq!(shannon_entropy(""), 0.0);
    }

    #[test]
    fn single_char_has_zero_entropy() {
        assert_eq!(shannon_entropy("a"), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
    }

    #[test]
    fn two_distinct_chars_have_one_bit() {
        assert!((shannon_entropy("ab") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn random_looking_beats_uniform() {
        assert!(shannon_entropy("8f3kZq1x") > shannon_entropy("aaaaaaaa"));
    }

    #[test]
    fn word_entropy_takes_the_maximum() {
        // "aaaa" contributes 0; the hex-ish token dominates.
        let line = "aaaa 8f3kZq1x";
        assert!((word_shannon_entropy(line) - shannon_entropy("8f3kZq1x")).abs() < f64::EPSILON);
    }

    #[test]
    fn word_entropy_of_blank_line_is_zero() {
        assert_eq!(word_shannon_entropy("   "), 0.0);
    }
}
