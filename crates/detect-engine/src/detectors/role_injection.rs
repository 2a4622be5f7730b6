//! Detects attempts to impersonate model-internal roles: training-format
//! special tokens, role-marker tags, role-switching phrases, and embedded
//! fake conversations.

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::detector::{all_matches, compiled, Detector, PatternFold};
use crate::result::{DetectionResult, PatternKind};

pub struct RoleInjectionDetector {
    /// Training-format tokens such as `<|user|>` or `<|im_start|>`.
    special_tokens: Regex,
    /// Opening or closing tags naming a privileged role.
    xml_tags: Regex,
    /// Phrases instructing the model to adopt another role.
    role_switch: Regex,
    /// Line-leading role labels that embed a fake conversation.
    conversation: Regex,
}

impl RoleInjectionDetector {
    pub fn new() -> Self {
        Self {
            special_tokens: compiled(r"<\|(?:user|assistant|system|end|im_start|im_end)\|>"),
            xml_tags: compiled(r"(?i)</?(?:user|assistant|system|admin|root)>"),
            role_switch: compiled(
                r"(?i)(?:you are now|act as|pretend to be|assume the role of|assume the role|switch to|become)\s+(?:an?\s+)?(?:admin|root|system|assistant|developer)",
            ),
            conversation: compiled(r"(?mi)^[ \t]*(?:user|assistant|system):\s+"),
        }
    }
}

impl Default for RoleInjectionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for RoleInjectionDetector {
    fn name(&self) -> &'static str {
        "role_injection"
    }

    fn detect(&self, input: &str, cancel: &CancellationToken) -> DetectionResult {
        if cancel.is_cancelled() {
            return DetectionResult::cancelled();
        }

        let mut fold = PatternFold::new();

        let matches = all_matches(&self.special_tokens, input);
        if !matches.is_empty() {
            fold.push(PatternKind::RoleInjectionSpecialToken, 0.9, matches);
        }

        let matches = all_matches(&self.xml_tags, input);
        if !matches.is_empty() {
            fold.push(PatternKind::RoleInjectionXmlTag, 0.7, matches);
        }

        let matches = all_matches(&self.role_switch, input);
        if !matches.is_empty() {
            fold.push(PatternKind::RoleInjectionRoleSwitch, 0.7, matches);
        }

        let matches = all_matches(&self.conversation, input);
        if !matches.is_empty() {
            fold.push(PatternKind::RoleInjectionConversation, 0.7, matches);
        }

        fold.into_result()
    }
}
