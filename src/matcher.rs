//! Title matching between catalog titles and the titles scraped sites display.
//!
//! Sites disagree with the catalog on punctuation, season suffixes and some
//! romanisation quirks, so a single similarity check is too brittle. Instead a
//! fixed cascade of normalisations is tried in order and the first stage that
//! clears the threshold wins.

use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_THRESHOLD: f64 = 0.9;

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

fn season_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"(?i)(th|rd|nd|st) (season)")
}

fn trailing_parens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"\([^(]*\)$")
}

fn special_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"[^\p{L}\p{N} ]")
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"\s+")
}

/// Drops "2nd Season"-style markers and a trailing parenthesised note.
#[must_use]
pub fn clean(title: &str) -> String {
    let without_season = season_suffix().replace_all(title, "");
    trailing_parens()
        .replace_all(&without_season, "")
        .trim_end()
        .to_string()
}

/// Replaces anything that is not a letter, digit or space with a space and
/// collapses the result.
#[must_use]
pub fn remove_special_chars(title: &str) -> String {
    let spaced = special_chars().replace_all(title, " ");
    whitespace().replace_all(&spaced, " ").trim().to_string()
}

/// Folds romanisation variants sites spell differently ("yuu" / "yu", "ou" / "oh").
#[must_use]
pub fn transform_specific_variations(title: &str) -> String {
    title.replace("yuu", "yu").replace(" ou", " oh")
}

fn strip_season_word(title: &str) -> String {
    title.replace("season", "").replace("  ", " ").trim_end().to_string()
}

fn similarity(a: &str, b: &str) -> f64 {
    strsim::sorensen_dice(a, b)
}

type Transform = fn(&str) -> String;

fn identity(s: &str) -> String {
    s.to_string()
}

fn clean_trimmed(s: &str) -> String {
    clean(s).trim_end().to_string()
}

fn special_and_variations(s: &str) -> String {
    remove_special_chars(&transform_specific_variations(s))
}

/// The fuzzy cascade, in evaluation order.
const FUZZY_STAGES: [(&str, Transform, Transform); 9] = [
    ("lowercase", identity, identity),
    ("season word / season suffix", strip_season_word, clean_trimmed),
    ("special chars on first", remove_special_chars, identity),
    ("special chars on second", identity, remove_special_chars),
    ("special chars on both", remove_special_chars, remove_special_chars),
    ("special chars and variations", special_and_variations, special_and_variations),
    ("season suffix on first", clean, identity),
    ("season suffix on second", identity, clean),
    ("season suffix on both", clean, clean),
];

/// Decides whether `a` and `b` name the same show.
///
/// Fuzzy mode walks [`FUZZY_STAGES`] and short-circuits on the first stage
/// whose Sørensen–Dice similarity reaches `threshold`. Non-fuzzy mode is a
/// separate, stricter set of equality checks.
#[must_use]
pub fn deep_match(a: &str, b: &str, fuzzy: bool, threshold: f64) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    if fuzzy {
        return FUZZY_STAGES.iter().any(|(stage, ta, tb)| {
            let score = similarity(&ta(&a), &tb(&b));
            if score >= threshold {
                tracing::trace!(stage, score, "Title match");
                true
            } else {
                false
            }
        });
    }

    a == b
        || strip_season_word(&a) == clean_trimmed(&b)
        || remove_special_chars(&a) == remove_special_chars(&b)
        || special_and_variations(&a) == special_and_variations(&b)
}

/// Fuzzy match at the default threshold.
#[must_use]
pub fn matches(a: &str, b: &str) -> bool {
    deep_match(a, b, true, DEFAULT_THRESHOLD)
}

/// Plain similarity of two lowercased strings, used by plugins for their
/// looser "current title" acceptance check.
#[must_use]
pub fn loose_similarity(a: &str, b: &str) -> f64 {
    similarity(&a.to_lowercase(), &b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_suffix_equivalence_without_fuzz() {
        assert!(deep_match(
            "Attack on Titan Season 2",
            "attack on titan 2nd season",
            false,
            DEFAULT_THRESHOLD
        ));
    }

    #[test]
    fn test_unrelated_titles_do_not_match() {
        assert!(!deep_match("Naruto", "Bleach", true, DEFAULT_THRESHOLD));
        assert!(!deep_match("Naruto", "Bleach", false, DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_punctuation_is_ignored_in_fuzzy_mode() {
        assert!(matches("Re:Zero kara Hajimeru Isekai Seikatsu", "Re Zero Kara Hajimeru Isekai Seikatsu"));
        assert!(matches("Kaguya-sama: Love is War", "kaguya sama love is war"));
    }

    #[test]
    fn test_non_fuzzy_rejects_near_misses() {
        assert!(!deep_match("One Piece", "One Punch Man", false, DEFAULT_THRESHOLD));
        assert!(deep_match("Kaguya-sama: Love is War", "kaguya sama love is war", false, DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_variations() {
        assert!(deep_match("Yuu Yuu Hakusho", "yu yu hakusho", false, DEFAULT_THRESHOLD));
        assert_eq!(transform_specific_variations("shingeki no yuusha ou"), "shingeki no yusha oh");
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("Overlord 3rd Season"), "Overlord 3");
        assert_eq!(clean("Fruits Basket (2019)"), "Fruits Basket");
        assert_eq!(clean("Mob Psycho 100 II"), "Mob Psycho 100 II");
        assert!(deep_match(
            "Attack on Titan Season 2",
            "attack on titan 2nd season",
            false,
            DEFAULT_THRESHOLD
        ));
    }

    #[test]
    fn test_remove_special_chars() {
        assert_eq!(remove_special_chars("Steins;Gate 0"), "Steins Gate 0");
        assert_eq!(remove_special_chars("  Dr. Stone!! "), "Dr Stone");
    }
}
