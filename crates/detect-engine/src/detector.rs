//! The detector contract and the score-folding helper shared by every local
//! detector.

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::result::{DetectedPattern, DetectionResult, PatternKind};

/// A single detection heuristic specialising in one attack family.
///
/// Detectors are pure functions of `(input, cancel)`: they hold only
/// read-only state compiled at construction, never fail, and poll the
/// cancellation token on entry. A cancelled detector returns the all-zero
/// safe verdict without doing any work.
pub trait Detector: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Analyse `input` and return a local verdict.
    fn detect(&self, input: &str, cancel: &CancellationToken) -> DetectionResult;
}

/// Compile a built-in pattern, which is a static literal checked by tests.
pub(crate) fn compiled(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in detection pattern must compile")
}

// ---------------------------------------------------------------------------
// Score folding
// ---------------------------------------------------------------------------

/// Accumulates per-category hits and tracks the running maximum score.
///
/// Detectors scan their categories in order of severity, `push` a record per
/// category that matched, and finish with one of the confidence rules:
/// `into_result` adds a single +0.05 when two or more categories fired,
/// `into_result_stacking` adds +0.05 per additional category. Both cap at
/// 1.0 and yield zero confidence when nothing fired.
pub(crate) struct PatternFold {
    patterns: Vec<DetectedPattern>,
    max_score: f64,
}

impl PatternFold {
    pub(crate) fn new() -> Self {
        Self {
            patterns: Vec::new(),
            max_score: 0.0,
        }
    }

    pub(crate) fn push(&mut self, kind: PatternKind, score: f64, matches: Vec<String>) {
        if score > self.max_score {
            self.max_score = score;
        }
        self.patterns.push(DetectedPattern {
            kind,
            score,
            matches,
        });
    }

    pub(crate) fn max_score(&self) -> f64 {
        self.max_score
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub(crate) fn into_result(self) -> DetectionResult {
        let confidence = if self.patterns.is_empty() {
            0.0
        } else if self.patterns.len() >= 2 {
            (self.max_score + 0.05).min(1.0)
        } else {
            self.max_score
        };
        DetectionResult::local(self.patterns, self.max_score, confidence)
    }

    pub(crate) fn into_result_stacking(self) -> DetectionResult {
        let confidence = if self.patterns.is_empty() {
            0.0
        } else {
            let extras = (self.patterns.len() - 1) as f64;
            (self.max_score + 0.05 * extras).min(1.0)
        };
        DetectionResult::local(self.patterns, self.max_score, confidence)
    }

    /// Finish with a caller-supplied confidence (used by the statistical
    /// detectors, whose confidence steps with input length instead of
    /// tracking severity).
    pub(crate) fn into_result_with_confidence(self, confidence: f64) -> DetectionResult {
        DetectionResult::local(self.patterns, self.max_score, confidence)
    }
}

/// Collect every non-overlapping match of `re` in `input` as owned strings.
pub(crate) fn all_matches(re: &Regex, input: &str) -> Vec<String> {
    re.find_iter(input).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_tracks_maximum_and_count() {
        let mut fold = PatternFold::new();
        fold.push(PatternKind::RoleInjectionXmlTag, 0.7, vec![]);
        fold.push(PatternKind::RoleInjectionSpecialToken, 0.9, vec![]);
        assert_eq!(fold.max_score(), 0.9);

        let result = fold.into_result();
        assert_eq!(result.risk_score, 0.9);
        // Two categories: +0.05 once.
        assert_eq!(result.confidence, 0.95);
        assert!(!result.safe);
    }

    #[test]
    fn fold_single_category_confidence_equals_score() {
        let mut fold = PatternFold::new();
        fold.push(PatternKind::PromptLeakRepeat, 0.7, vec![]);
        let result = fold.into_result();
        assert_eq!(result.confidence, 0.7);
    }

    #[test]
    fn stacking_confidence_grows_per_category() {
        let mut fold = PatternFold::new();
        fold.push(PatternKind::PromptLeakSystemPrompt, 0.9, vec![]);
        fold.push(PatternKind::PromptLeakInstructions, 0.8, vec![]);
        fold.push(PatternKind::PromptLeakRepeat, 0.7, vec![]);
        let result = fold.into_result_stacking();
        // 0.9 + 2 × 0.05, capped.
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn empty_fold_is_safe_with_zero_confidence() {
        let result = PatternFold::new().into_result();
        assert!(result.safe);
        assert_eq!(result.risk_score, 0.0);
        assert_eq!(result.confidence, 0.0);
        assert!(result.detected_patterns.is_empty());
    }
}
