//! Proxy for English naturalness using character-bigram rarity. Catches
//! adversarial suffixes, keyboard mashing, and gibberish tokens hidden in
//! otherwise normal text.

use tokio_util::sync::CancellationToken;

use crate::detector::{Detector, PatternFold};
use crate::result::{DetectionResult, PatternKind};

/// Inputs shorter than this many code points are skipped.
const MIN_INPUT_CHARS: usize = 10;

/// English consonants, for cluster detection.
const CONSONANTS: &str = "bcdfghjklmnpqrstvwxyz";

/// Frequent English character bigrams, including space-adjacent pairs and a
/// few technical digraphs, against which rarity is measured.
const COMMON_BIGRAMS: [&str; 85] = [
    "th", "he", "in", "er", "an", "re", "on", "at", "en", "nd", "ti", "es", "or", "te", "of",
    "ed", "is", "it", "al", "ar", "st", "to", "nt", "ng", "se", "ha", "as", "ou", "io", "le",
    "ve", "co", "me", "de", "hi", "ri", "ro", "ic", "ne", "ea", "ra", "ce", "li", "ch", "ll",
    "be", "ma", "si", "om", "ur",
    // Common with spaces.
    "e ", "t ", "d ", "s ", "n ", " t", " a", " i", " o", " w", " s", " h", " b", " f", " m",
    // Technical/common abbreviations.
    "tt", "tp", "ip", "ow", "wo", "do", "oe", "ho", "cp", "tc",
    // Frequent pairs the base table misses.
    "we", "wh", "wa", "la", "ta", "el", "et", "ys", "us", "pr",
];

pub struct PerplexityDetector {
    /// Rare-bigram ratio above which the whole input is flagged.
    threshold: f64,
}

impl PerplexityDetector {
    pub fn new() -> Self {
        Self { threshold: 0.60 }
    }
}

impl Default for PerplexityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for PerplexityDetector {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    fn detect(&self, input: &str, cancel: &CancellationToken) -> DetectionResult {
        if cancel.is_cancelled() {
            return DetectionResult::cancelled();
        }

        let char_count = input.chars().count();
        if char_count < MIN_INPUT_CHARS {
            return DetectionResult::skipped();
        }

        let normalized = input.to_lowercase();
        let mut fold = PatternFold::new();

        let rare_ratio = rare_bigram_ratio(&normalized);
        if rare_ratio > self.threshold {
            let score = (0.6 + (rare_ratio - self.threshold) * 0.8).min(1.0);
            fold.push(
                PatternKind::PerplexityUnnaturalText,
                score,
                vec![format!(
                    "Rare character bigrams: {}%",
                    (rare_ratio * 100.0) as u32
                )],
            );
        }

        let clusters = consonant_clusters(&normalized);
        if clusters.len() > 3 {
            let samples = clusters.into_iter().take(3).collect();
            fold.push(PatternKind::PerplexityConsonantClusters, 0.60, samples);
        }

        let gibberish = gibberish_words(&normalized);
        if !gibberish.is_empty() {
            let samples = gibberish.into_iter().take(3).collect();
            fold.push(PatternKind::PerplexityGibberishSequence, 0.70, samples);
        }

        let non_alpha = non_alphabetic_ratio(input);
        if non_alpha > 0.5 && char_count > 20 {
            fold.push(
                PatternKind::PerplexityGibberish,
                0.70,
                vec![format!(
                    "Non-alphabetic characters: {}%",
                    (non_alpha * 100.0) as u32
                )],
            );
        }

        let confidence = if fold.is_empty() {
            0.0
        } else if char_count > 100 {
            (fold.max_score() + 0.05).min(1.0)
        } else {
            fold.max_score()
        };

        fold.into_result_with_confidence(confidence)
    }
}

/// Fraction of ASCII letter/space bigrams absent from the common table.
/// Bigrams touching digits or punctuation are not counted either way.
fn rare_bigram_ratio(text: &str) -> f64 {
    let bytes = text.as_bytes();
    let mut total = 0usize;
    let mut rare = 0usize;

    for pair in bytes.windows(2) {
        if !is_alpha_or_space(pair[0]) || !is_alpha_or_space(pair[1]) {
            continue;
        }
        total += 1;
        let bigram = [pair[0], pair[1]];
        let bigram = std::str::from_utf8(&bigram).unwrap_or("");
        if !COMMON_BIGRAMS.contains(&bigram) {
            rare += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }
    rare as f64 / total as f64
}

fn is_alpha_or_space(b: u8) -> bool {
    b.is_ascii_lowercase() || b == b' '
}

/// Runs of four or more consecutive consonants, unusual in English.
fn consonant_clusters(text: &str) -> Vec<String> {
    let mut clusters = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if CONSONANTS.contains(c) {
            current.push(c);
        } else {
            if current.chars().count() >= 4 {
                clusters.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.chars().count() >= 4 {
        clusters.push(current);
    }

    clusters
}

/// Long mostly-alphabetic tokens whose own bigrams are overwhelmingly rare.
/// The length floor keeps short random identifiers from false-positiving.
fn gibberish_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|word| {
            word.chars().count() >= 18
                && non_alphabetic_ratio(word) <= 0.25
                && rare_bigram_ratio(word) > 0.65
        })
        .map(|word| word.to_string())
        .collect()
}

/// Fraction of characters that are neither letters nor whitespace.
fn non_alphabetic_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut non_alpha = 0usize;
    for c in text.chars() {
        total += 1;
        if !c.is_alphabetic() && !c.is_whitespace() {
            non_alpha += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    non_alpha as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(input: &str) -> DetectionResult {
        PerplexityDetector::new().detect(input, &CancellationToken::new())
    }

    fn kinds(result: &DetectionResult) -> Vec<&PatternKind> {
        result.detected_patterns.iter().map(|p| &p.kind).collect()
    }

    #[test]
    fn short_inputs_are_skipped() {
        let result = detect("zxqwvkj");
        assert!(result.safe);
        assert_eq!(result.confidence, 0.5);
        assert!(result.detected_patterns.is_empty());
    }

    #[test]
    fn natural_english_is_safe() {
        for input in [
            "What is the weather like today?",
            "Please summarize the attached article about renewable energy.",
            "The restaurant on the corner serves excellent pasta.",
        ] {
            let result = detect(input);
            assert!(result.safe, "expected safe for: {input}");
            assert!(result.detected_patterns.is_empty(), "patterns for: {input}");
        }
    }

    #[test]
    fn keyboard_mash_is_flagged_as_unnatural() {
        let result = detect("xk jq zv wq px fk gj qz kx vj");
        assert!(!result.safe);
        assert!(kinds(&result).contains(&&PatternKind::PerplexityUnnaturalText));
        let pattern = &result.detected_patterns[0];
        assert!(pattern.matches[0].starts_with("Rare character bigrams:"));
    }

    #[test]
    fn consonant_cluster_extraction() {
        let clusters = consonant_clusters("zxkvw and mnbvc and qwrtz and plkjh");
        assert_eq!(clusters.len(), 4);
        assert!(clusters.contains(&"zxkvw".to_string()));
    }

    #[test]
    fn many_consonant_clusters_are_flagged() {
        let result = detect("zxkvw mnbvc qwrtz plkjh normal words here");
        assert!(kinds(&result).contains(&&PatternKind::PerplexityConsonantClusters));
        // At most three sample clusters are reported.
        let pattern = result
            .detected_patterns
            .iter()
            .find(|p| p.kind == PatternKind::PerplexityConsonantClusters)
            .unwrap();
        assert!(pattern.matches.len() <= 3);
    }

    #[test]
    fn embedded_gibberish_word_is_flagged() {
        let result = detect("please process zqxjkvwpzqxjkvwpzqxj for me");
        assert!(kinds(&result).contains(&&PatternKind::PerplexityGibberishSequence));
    }

    #[test]
    fn long_real_words_are_not_gibberish() {
        // 18+ characters but ordinary bigrams.
        let result = detect("antidisestablishmentarianism is a real English word");
        assert!(!kinds(&result).contains(&&PatternKind::PerplexityGibberishSequence));
    }

    #[test]
    fn symbol_soup_is_flagged_as_gibberish() {
        let result = detect("@#$% ^&*( )_+= {}[] <>?/ |\\~` !@#$");
        assert!(kinds(&result).contains(&&PatternKind::PerplexityGibberish));
    }

    #[test]
    fn confidence_gets_length_bonus() {
        let mash = "xk jq zv wq px fk gj qz kx vj ".repeat(5); // > 100 chars
        let result = detect(&mash);
        assert!(!result.safe);
        let base = result
            .detected_patterns
            .iter()
            .map(|p| p.score)
            .fold(0.0f64, f64::max);
        assert!((result.confidence - (base + 0.05).min(1.0)).abs() < 1e-9);
    }

    #[test]
    fn cancellation_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = PerplexityDetector::new().detect("any input text", &cancel);
        assert!(result.safe);
        assert_eq!(result.confidence, 0.0);
    }
}
