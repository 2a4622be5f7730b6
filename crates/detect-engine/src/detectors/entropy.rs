//! Flags high-entropy inputs. Encoded, compressed, or encrypted payloads
//! push the Shannon entropy of the byte distribution well above what
//! natural-language text reaches.

use tokio_util::sync::CancellationToken;

use crate::detector::{Detector, PatternFold};
use crate::result::{DetectionResult, PatternKind};

/// Entropy is computed over bytes, so the theoretical maximum is 8 bits.
const MAX_ENTROPY: f64 = 8.0;

/// Inputs shorter than this (in bytes) carry too little signal to measure.
const MIN_INPUT_BYTES: usize = 20;

pub struct EntropyDetector {
    /// Bits-per-byte level above which the input is flagged.
    threshold: f64,
}

impl EntropyDetector {
    /// Default threshold: 4.5 of a theoretical 8.0. English prose sits
    /// around 4.0–4.3; base64 and ciphertext land near 6.0.
    pub fn new() -> Self {
        Self { threshold: 4.5 }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for EntropyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for EntropyDetector {
    fn name(&self) -> &'static str {
        "entropy"
    }

    fn detect(&self, input: &str, cancel: &CancellationToken) -> DetectionResult {
        if cancel.is_cancelled() {
            return DetectionResult::cancelled();
        }

        if input.len() < MIN_INPUT_BYTES {
            return DetectionResult::skipped();
        }

        let entropy = shannon_entropy(input.as_bytes());
        let mut fold = PatternFold::new();

        if entropy > self.threshold {
            let normalized = entropy / MAX_ENTROPY;
            // Maps the 0.5–1.0 normalized band onto 0.6–1.0 risk.
            let score = (0.6 + (normalized - 0.5) * 0.8).min(1.0);
            fold.push(
                PatternKind::EntropyHighRandomness,
                score,
                vec![format!("High entropy detected: {entropy:.2}/8.0")],
            );
        }

        // More data makes the estimate more trustworthy, flagged or not.
        let confidence = match input.len() {
            len if len >= 500 => 0.9,
            len if len >= 100 => 0.8,
            _ => 0.7,
        };

        fold.into_result_with_confidence(confidence)
    }
}

/// Shannon entropy of a byte slice in bits per byte: `H = -Σ p(x) log2 p(x)`.
fn shannon_entropy(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }

    let mut freq = [0u32; 256];
    for &b in bytes {
        freq[b as usize] += 1;
    }

    let len = bytes.len() as f64;
    freq.iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(input: &str) -> DetectionResult {
        EntropyDetector::new().detect(input, &CancellationToken::new())
    }

    #[test]
    fn entropy_of_uniform_text_is_zero() {
        assert_eq!(shannon_entropy(b"aaaaaaaa"), 0.0);
    }

    #[test]
    fn entropy_of_two_symbols_is_one_bit() {
        let h = shannon_entropy(b"abababab");
        assert!((h - 1.0).abs() < 1e-9);
    }

    #[test]
    fn short_inputs_are_skipped() {
        let result = detect("AbC123xyz!");
        assert!(result.safe);
        assert_eq!(result.risk_score, 0.0);
        assert_eq!(result.confidence, 0.5);
        assert!(result.detected_patterns.is_empty());
    }

    #[test]
    fn natural_text_is_safe() {
        let result = detect("What is the weather like today in the city of Paris?");
        assert!(result.safe);
        assert_eq!(result.risk_score, 0.0);
        assert!(result.detected_patterns.is_empty());
        // Innocence confidence still steps with length.
        assert_eq!(result.confidence, 0.7);
    }

    #[test]
    fn random_blob_is_flagged() {
        // A spread of distinct bytes pushes entropy past the 4.5 threshold.
        let input = "k8Jq2xVp9ZnR4mTw7yBc1LdF6gHs3aEuQi5oNv0MKPXWYG!@#$%^&*()";
        let result = detect(input);
        assert!(!result.safe);
        assert_eq!(result.detected_patterns.len(), 1);
        let pattern = &result.detected_patterns[0];
        assert_eq!(pattern.kind, PatternKind::EntropyHighRandomness);
        assert!(pattern.score >= 0.6);
        assert!(pattern.matches[0].starts_with("High entropy detected:"));
    }

    #[test]
    fn confidence_steps_with_length() {
        let medium = "a1b2c3d4".repeat(20); // 160 bytes, low entropy
        let result = detect(&medium);
        assert_eq!(result.confidence, 0.8);

        let long = "a1b2c3d4".repeat(80); // 640 bytes
        let result = detect(&long);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn custom_threshold_is_honoured() {
        let strict = EntropyDetector::with_threshold(2.0);
        let result = strict.detect(
            "What is the weather like today in Paris?",
            &CancellationToken::new(),
        );
        // Ordinary prose exceeds two bits per byte.
        assert!(!result.detected_patterns.is_empty());
    }

    #[test]
    fn cancellation_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = EntropyDetector::new().detect("whatever text this is", &cancel);
        assert!(result.safe);
        assert_eq!(result.confidence, 0.0);
    }
}
