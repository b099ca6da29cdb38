//! Title comparison helpers for cross-source acceptance checks.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Normalize a title for comparison: NFKD-decompose, strip to ASCII,
/// keep only `[a-zA-Z0-9]`, lowercase.
pub fn normalize_title(title: &str) -> String {
    let decomposed: String = title.nfkd().filter(|c| c.is_ascii()).collect();
    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());
    NON_ALNUM.replace_all(&decomposed, "").to_lowercase()
}

/// Fuzzy title equality (ratio ≥ 0.95 over normalized forms).
pub fn titles_match(title_a: &str, title_b: &str) -> bool {
    let norm_a = normalize_title(title_a);
    let norm_b = normalize_title(title_b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return false;
    }
    rapidfuzz::fuzz::ratio(norm_a.chars(), norm_b.chars()) >= 0.95
}

/// Prefix length used when deciding whether two titles name the same paper.
const PREFIX_LEN: usize = 30;

/// Whether one title's leading characters appear in the other, over
/// normalized forms. Guards title-only search hits against returning an
/// abstract for the wrong paper when one side carries a subtitle.
pub fn titles_prefix_overlap(title_a: &str, title_b: &str) -> bool {
    let norm_a = normalize_title(title_a);
    let norm_b = normalize_title(title_b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return false;
    }
    let prefix_a: String = norm_a.chars().take(PREFIX_LEN).collect();
    let prefix_b: String = norm_b.chars().take(PREFIX_LEN).collect();
    norm_b.contains(&prefix_a) || norm_a.contains(&prefix_b)
}

/// Fraction of `expected`'s content words (longer than 3 letters) that
/// also occur in `found`. Used to cross-check a DOI lookup against the
/// title the caller expected.
pub fn title_word_overlap(expected: &str, found: &str) -> f64 {
    let expected_words = content_words(expected);
    let found_words = content_words(found);
    if expected_words.is_empty() {
        return 0.0;
    }
    expected_words.intersection(&found_words).count() as f64 / expected_words.len() as f64
}

fn content_words(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|word| word.len() > 3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── normalize_title ────────────────────────────────────────────────

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_title("Hello, World! 123"), "helloworld123");
    }

    #[test]
    fn normalize_decomposes_accents() {
        assert_eq!(normalize_title("résumé"), "resume");
    }

    #[test]
    fn normalize_empty() {
        assert_eq!(normalize_title("—…"), "");
    }

    // ── titles_match ───────────────────────────────────────────────────

    #[test]
    fn exact_titles_match() {
        assert!(titles_match(
            "Freedom of the Will and the Concept of a Person",
            "Freedom of the Will and the Concept of a Person"
        ));
    }

    #[test]
    fn minor_typo_still_matches() {
        assert!(titles_match(
            "Epistemic Injustice: Power and the Ethics of Knowing",
            "Epistemic Injustice: Power and the Ethics of Knowin"
        ));
    }

    #[test]
    fn different_titles_do_not_match() {
        assert!(!titles_match(
            "Freedom of the Will",
            "A Completely Different Paper About Causation"
        ));
    }

    #[test]
    fn empty_title_never_matches() {
        assert!(!titles_match("", "Something"));
        assert!(!titles_match("Something", ""));
    }

    #[test]
    fn accented_vs_ascii_matches() {
        assert!(titles_match(
            "Déjà Vu and the Phenomenology of Memory",
            "Deja Vu and the Phenomenology of Memory"
        ));
    }

    // ── titles_prefix_overlap ──────────────────────────────────────────

    #[test]
    fn subtitle_variant_overlaps() {
        assert!(titles_prefix_overlap(
            "Freedom of the Will and the Concept of a Person",
            "Freedom of the Will"
        ));
    }

    #[test]
    fn long_titles_overlap_on_shared_prefix() {
        assert!(titles_prefix_overlap(
            "Epistemic Injustice: Power and the Ethics of Knowing",
            "Epistemic injustice — power and the ethics of knowing (reprint)"
        ));
    }

    #[test]
    fn unrelated_titles_do_not_overlap() {
        assert!(!titles_prefix_overlap(
            "Freedom of the Will",
            "Two Dogmas of Empiricism"
        ));
    }

    #[test]
    fn empty_title_never_overlaps() {
        assert!(!titles_prefix_overlap("", "Freedom of the Will"));
    }

    // ── title_word_overlap ─────────────────────────────────────────────

    #[test]
    fn identical_titles_overlap_fully() {
        let overlap = title_word_overlap(
            "Freedom of the Will and the Concept of a Person",
            "Freedom of the Will and the Concept of a Person",
        );
        assert!((overlap - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn short_stopwords_are_ignored() {
        // "of"/"the"/"and" fall under the 4-letter floor on both sides
        let overlap = title_word_overlap("Freedom of the Will", "Freedom and the Will");
        assert!((overlap - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disjoint_titles_have_zero_overlap() {
        assert_eq!(
            title_word_overlap("Freedom of the Will", "Naming and Necessity"),
            0.0
        );
    }

    #[test]
    fn partial_overlap_is_fractional() {
        let overlap = title_word_overlap(
            "Freedom of the Will and the Concept of a Person",
            "Freedom of the Will",
        );
        assert!(overlap > 0.0 && overlap < 1.0);
    }

    #[test]
    fn punctuation_does_not_break_word_matching() {
        let overlap = title_word_overlap("Epistemic Injustice: Power", "epistemic injustice power");
        assert!((overlap - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_expected_title_is_zero() {
        assert_eq!(title_word_overlap("", "Freedom of the Will"), 0.0);
    }
}
