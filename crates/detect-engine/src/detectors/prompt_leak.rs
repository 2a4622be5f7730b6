//! Detects attempts to exfiltrate the hidden system prompt, from blunt
//! "show me your prompt" requests to indirect formatting and completion
//! tricks.

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::detector::{all_matches, compiled, Detector, PatternFold};
use crate::result::{DetectionResult, PatternKind};

pub struct PromptLeakDetector {
    /// Direct requests for the system/initial/original prompt.
    system_prompt: Regex,
    /// Requests for the instructions, rules, or guidelines.
    instructions: Regex,
    /// Repeat/recall commands aimed at the preceding context.
    repeat: Regex,
    /// Meta-questions about how the model was set up.
    config: Regex,
    /// Indirect exfiltration through an output format.
    format_indirect: Regex,
    /// Completion tricks ("your prompt begins with ...").
    completion_trick: Regex,
    /// Fake authority escalations demanding an override.
    authority_override: Regex,
}

impl PromptLeakDetector {
    pub fn new() -> Self {
        Self {
            system_prompt: compiled(
                r"(?i)(?:show|reveal|display|print|output|give me|what is|what's).*(?:system prompt|initial prompt|original prompt)",
            ),
            instructions: compiled(
                r"(?i)(?:show|reveal|display|what are|tell me|give me).*(?:your |the )(?:instructions?|rules?|guidelines?|directives?)",
            ),
            repeat: compiled(
                r"(?i)(?:repeat|print|show|output|copy).*(?:above|previous|earlier|before this|the text|everything)",
            ),
            config: compiled(
                r"(?i)(?:what were you|how were you|what are you).*(?:told|programmed|configured|instructed|trained|set up)",
            ),
            format_indirect: compiled(
                r"(?i)(?:output|render|print|format|write)\b.*\byour\b.*\b(?:prompt|instructions?|rules?)\b.*\b(?:in|as)\s+(?:markdown|json|yaml|html)",
            ),
            completion_trick: compiled(
                r"(?i)(?:complete|finish|continue)\b.*\b(?:your|the)\s+(?:system\s+)?prompt\s+(?:begins?|starts?)\s+with",
            ),
            authority_override: compiled(
                r"(?i)(?:important|urgent|admin|administrator|security alert)\s*:.*\b(?:overrid\w*|disregard\w*|ignor\w*)\b.*\b(?:instructions?|prompts?|rules?)",
            ),
        }
    }
}

impl Default for PromptLeakDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for PromptLeakDetector {
    fn name(&self) -> &'static str {
        "prompt_leak"
    }

    fn detect(&self, input: &str, cancel: &CancellationToken) -> DetectionResult {
        if cancel.is_cancelled() {
            return DetectionResult::cancelled();
        }

        let mut fold = PatternFold::new();

        let checks: [(&Regex, PatternKind, f64); 7] = [
            (&self.authority_override, PatternKind::PromptLeakAuthorityOverride, 0.95),
            (&self.system_prompt, PatternKind::PromptLeakSystemPrompt, 0.90),
            (&self.completion_trick, PatternKind::PromptLeakCompletionTrick, 0.90),
            (&self.instructions, PatternKind::PromptLeakInstructions, 0.80),
            (&self.format_indirect, PatternKind::PromptLeakFormatIndirect, 0.75),
            (&self.repeat, PatternKind::PromptLeakRepeat, 0.70),
            (&self.config, PatternKind::PromptLeakConfig, 0.70),
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
