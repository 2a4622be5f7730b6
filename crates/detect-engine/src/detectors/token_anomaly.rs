//! Detects unusual character distributions: mixed Unicode scripts,
//! special-character and digit floods, zero-width spam, and keyboard-mash
//! repetition.

use tokio_util::sync::CancellationToken;

use crate::detector::{Detector, PatternFold};
use crate::result::{DetectionResult, PatternKind};

/// Inputs shorter than this many code points are skipped.
const MIN_INPUT_CHARS: usize = 10;

/// Zero-width code points counted toward the spam signal.
const ZERO_WIDTH_CHARS: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}', '\u{2060}'];

pub struct TokenAnomalyDetector {
    /// Special-character ratio above which the input is flagged.
    special_char_threshold: f64,
    /// Digit ratio above which the input is flagged.
    digit_threshold: f64,
}

impl TokenAnomalyDetector {
    pub fn new() -> Self {
        Self {
            special_char_threshold: 0.4,
            digit_threshold: 0.7,
        }
    }
}

impl Default for TokenAnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for TokenAnomalyDetector {
    fn name(&self) -> &'static str {
        "token_anomaly"
    }

    fn detect(&self, input: &str, cancel: &CancellationToken) -> DetectionResult {
        if cancel.is_cancelled() {
            return DetectionResult::cancelled();
        }

        let char_count = input.chars().count();
        if char_count < MIN_INPUT_CHARS {
            return DetectionResult::skipped();
        }

        let mut fold = PatternFold::new();

        let scripts = scripts_present(input);
        if scripts.len() >= 2 {
            // More scripts mixed together, higher risk.
            let score = (0.6 + 0.1 * (scripts.len() as f64 - 2.0)).min(0.9);
            fold.push(PatternKind::TokenUnicodeMixing, score, scripts);
        }

        let special_ratio = special_char_ratio(input);
        if special_ratio > self.special_char_threshold {
            let score = (0.6 + (special_ratio - self.special_char_threshold) * 0.8).min(1.0);
            fold.push(
                PatternKind::TokenExcessiveSpecialChars,
                score,
                vec![format!(
                    "Special characters: {}%",
                    (special_ratio * 100.0) as u32
                )],
            );
        }

        let digit_ratio = digit_ratio(input);
        if digit_ratio > self.digit_threshold && char_count > 20 {
            fold.push(
                PatternKind::TokenExcessiveDigits,
                0.65,
                vec![format!("Digits: {}%", (digit_ratio * 100.0) as u32)],
            );
        }

        let zero_width = input
            .chars()
            .filter(|c| ZERO_WIDTH_CHARS.contains(c))
            .count();
        if zero_width > 3 {
            fold.push(
                PatternKind::TokenZeroWidthSpam,
                0.70,
                vec![format!("Zero-width characters: {zero_width} detected")],
            );
        }

        let repetition = repetition_ratio(input);
        if repetition > 0.5 && char_count > 15 {
            fold.push(
                PatternKind::TokenRepetitionPattern,
                0.60,
                vec![format!(
                    "Character repetition: {}%",
                    (repetition * 100.0) as u32
                )],
            );
        }

        let confidence = match char_count {
            len if len >= 500 => 0.9,
            len if len >= 100 => 0.8,
            _ => 0.7,
        };

        fold.into_result_with_confidence(confidence)
    }
}

// ---------------------------------------------------------------------------
// Character statistics
// ---------------------------------------------------------------------------

/// Names of the writing scripts found in the input, in first-seen order.
/// Whitespace, punctuation, and digits are ignored.
fn scripts_present(input: &str) -> Vec<String> {
    let mut names: Vec<&str> = Vec::new();

    for c in input.chars() {
        if c.is_whitespace() || c.is_ascii_punctuation() || c.is_numeric() {
            continue;
        }
        let script = if is_latin(c) {
            "Latin"
        } else if is_cyrillic(c) {
            "Cyrillic"
        } else if is_greek(c) {
            "Greek"
        } else if is_arabic(c) {
            "Arabic"
        } else if is_cjk(c) {
            "CJK"
        } else {
            continue;
        };
        if !names.contains(&script) {
            names.push(script);
        }
    }

    names.into_iter().map(str::to_string).collect()
}

fn special_char_ratio(input: &str) -> f64 {
    ratio_of(input, |c| {
        !c.is_alphanumeric() && !c.is_whitespace()
    })
}

fn digit_ratio(input: &str) -> f64 {
    ratio_of(input, |c| c.is_numeric())
}

fn ratio_of(input: &str, pred: impl Fn(char) -> bool) -> f64 {
    let mut total = 0usize;
    let mut hits = 0usize;
    for c in input.chars() {
        total += 1;
        if pred(c) {
            hits += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    hits as f64 / total as f64
}

/// Fraction of positions starting a run of three identical characters.
fn repetition_ratio(input: &str) -> f64 {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() < 3 {
        return 0.0;
    }
    let triples = chars
        .windows(3)
        .filter(|w| w[0] == w[1] && w[1] == w[2])
        .count();
    triples as f64 / chars.len() as f64
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic()
        || ('\u{00C0}'..='\u{00FF}').contains(&c)
        || ('\u{0100}'..='\u{017F}').contains(&c)
}

fn is_cyrillic(c: char) -> bool {
    ('\u{0400}'..='\u{04FF}').contains(&c)
}

fn is_greek(c: char) -> bool {
    ('\u{0370}'..='\u{03FF}').contains(&c)
}

fn is_arabic(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c)
}

fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
        || ('\u{3040}'..='\u{309F}').contains(&c)
        || ('\u{30A0}'..='\u{30FF}').contains(&c)
        || ('\u{AC00}'..='\u{D7AF}').contains(&c)
}
