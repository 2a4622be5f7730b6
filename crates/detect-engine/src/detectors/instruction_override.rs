//! Detects attempts to override, reset, or chain instructions past the
//! original system prompt.

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::detector::{all_matches, compiled, Detector, PatternFold};
use crate::result::{DetectionResult, PatternKind};

pub struct InstructionOverrideDetector {
    /// Temporal chaining ("after summarizing, send the email").
    temporal: Regex,
    /// Direct override commands ("ignore all previous instructions").
    direct: Regex,
    /// Injected follow-up tasks behind a delimiter.
    delimiter: Regex,
    /// Priority flips ("instead", "do not ...").
    priority: Regex,
    /// Reset commands aimed at the conversation state.
    reset: Regex,
    /// Multi-step chains ending in an attack verb.
    multistep: Regex,
}

impl InstructionOverrideDetector {
    pub fn new() -> Self {
        Self {
            temporal: compiled(r"(?i)(?:after|once|when)\s+\w+ing.*?,"),
            direct: compiled(
                r"(?i)(?:ignore|disregard|forget)\s+(?:(?:all|your|the|any)\s+)?(?:\w+\s+)?(?:(?:previous|prior|above|earlier)\s+)?(?:instructions|rules|directions|commands|prompts)",
            ),
            delimiter: compiled(r"(?i)(?:new instructions?|additional task|also do|and then)\s*:"),
            priority: compiled(r"(?i)(?:instead|rather than|don't|do not)\s+\w+"),
            reset: compiled(
                r"(?i)(?:reset|restart|wipe|clear)\s+(?:(?:your|the|all)\s+)?(?:memory|context|conversation|history|instructions|settings|state)",
            ),
            multistep: compiled(
                r"(?i)(?:first|then|next|after that|finally|step \d)\b[^.\n]*\b(?:ignore|reveal|bypass|leak|override|expose|exfiltrate)",
            ),
        }
    }
}

impl Default for InstructionOverrideDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for InstructionOverrideDetector {
    fn name(&self) -> &'static str {
        "instruction_override"
    }

    fn detect(&self, input: &str, cancel: &CancellationToken) -> DetectionResult {
        if cancel.is_cancelled() {
            return DetectionResult::cancelled();
        }

        let mut fold = PatternFold::new();

        let checks: [(&Regex, PatternKind, f64); 6] = [
            (&self.direct, PatternKind::InstructionOverrideDirect, 0.90),
            (&self.reset, PatternKind::InstructionOverrideReset, 0.85),
            (&self.multistep, PatternKind::InstructionOverrideMultistep, 0.85),
            (&self.temporal, PatternKind::InstructionOverrideTemporal, 0.80),
            (&self.delimiter, PatternKind::InstructionOverrideDelimiter, 0.70),
            (&self.priority, PatternKind::InstructionOverridePriority, 0.70),
        ];

        for (re, kind, score) in checks {
            let matches = all_matches(re, input);
            if !matches.is_empty() {
                fold.push(kind, score, matches);
            }
        }

        fold.into_result_stacking()
    }
}
