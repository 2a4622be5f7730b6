//! Bridges an [`LlmJudge`] into the detection pipeline, translating its
//! verdict (or failure) into the shared result shape.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use llm_judge::{JudgeError, LlmJudge};

use crate::result::{DetectedPattern, DetectionResult, PatternKind};

/// Upper bound on a judge call, independent of whatever timeout the judge
/// itself enforces.
const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Wraps a judge so the engine can treat it like any other detector. The
/// judge is the only tier that can fail; failures never surface as errors
/// but as a diagnostic [`PatternKind::LlmError`] pattern on a safe verdict.
pub struct LlmDetector {
    judge: Arc<dyn LlmJudge>,
    timeout: Duration,
}

impl LlmDetector {
    pub fn new(judge: Arc<dyn LlmJudge>) -> Self {
        Self {
            judge,
            timeout: DEFAULT_JUDGE_TIMEOUT,
        }
    }

    pub fn with_timeout(judge: Arc<dyn LlmJudge>, timeout: Duration) -> Self {
        Self { judge, timeout }
    }

    pub async fn detect(&self, input: &str, cancel: &CancellationToken) -> DetectionResult {
        let outcome = tokio::time::timeout(self.timeout, self.judge.judge(input, cancel)).await;

        let verdict = match outcome {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => return Self::error_result(err.to_string()),
            Err(_) => {
                return Self::error_result(
                    JudgeError::Timeout(self.timeout).to_string(),
                )
            }
        };

        debug!(
            is_attack = verdict.is_attack,
            confidence = verdict.confidence,
            attack_type = %verdict.attack_type,
            "judge verdict received"
        );

        let mut patterns = Vec::new();
        let mut risk_score = 0.0;

        if verdict.is_attack {
            let mut matches = vec!["LLM detected attack".to_string()];
            if !verdict.reasoning.is_empty() {
                matches.push(verdict.reasoning.clone());
            }
            patterns.push(DetectedPattern {
                kind: PatternKind::llm(&verdict.attack_type),
                score: verdict.confidence,
                matches,
            });
            risk_score = verdict.confidence;
        }

        DetectionResult {
            safe: !verdict.is_attack,
            risk_score,
            confidence: verdict.confidence,
            detected_patterns: patterns,
            llm_result: Some(verdict),
        }
    }

    fn error_result(message: String) -> DetectionResult {
        DetectionResult {
            safe: true,
            risk_score: 0.0,
            confidence: 0.0,
            detected_patterns: vec![DetectedPattern {
                kind: PatternKind::LlmError,
                score: 0.0,
                matches: vec![message],
            }],
            llm_result: None,
        }
    }
}
