//! Detection result model: the pattern catalog, evidence records, and the
//! verdict shape shared by individual detectors and the engine.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use llm_judge::JudgeVerdict;

/// Local risk level above which a single detector considers its own verdict
/// unsafe. The engine overrides this with the configured threshold when it
/// fuses detector outputs.
pub(crate) const LOCAL_UNSAFE_SCORE: f64 = 0.7;

/// Round to two decimal places. Every score and confidence leaving the
/// library goes through this.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Pattern catalog
// ---------------------------------------------------------------------------

/// The closed catalog of pattern identifiers emitted by the local detectors,
/// plus the open-ended judge-assigned tags.
///
/// The string form (via [`Display`](fmt::Display) and serde) is external
/// contract: telemetry and API consumers match on it, so the mapping is
/// exact and stable. Judge tags are carried as data in [`PatternKind::Llm`]
/// because the judge taxonomy is not validated against the local catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternKind {
    RoleInjectionSpecialToken,
    RoleInjectionXmlTag,
    RoleInjectionRoleSwitch,
    RoleInjectionConversation,
    PromptLeakSystemPrompt,
    PromptLeakInstructions,
    PromptLeakRepeat,
    PromptLeakConfig,
    PromptLeakFormatIndirect,
    PromptLeakCompletionTrick,
    PromptLeakAuthorityOverride,
    InstructionOverrideTemporal,
    InstructionOverrideDirect,
    InstructionOverrideDelimiter,
    InstructionOverridePriority,
    InstructionOverrideReset,
    InstructionOverrideMultistep,
    ObfuscationBase64,
    ObfuscationHex,
    ObfuscationUnicodeEscape,
    ObfuscationExcessiveSpecial,
    ObfuscationZeroWidth,
    ObfuscationHomoglyph,
    DelimiterSystemBoundary,
    DelimiterSqlStyle,
    DelimiterCodeComment,
    DelimiterExcessive,
    NormalizationCharacterObfuscation,
    NormalizationSuspiciousFormatting,
    EntropyHighRandomness,
    PerplexityUnnaturalText,
    PerplexityConsonantClusters,
    PerplexityGibberishSequence,
    PerplexityGibberish,
    TokenUnicodeMixing,
    TokenExcessiveSpecialChars,
    TokenExcessiveDigits,
    TokenZeroWidthSpam,
    TokenRepetitionPattern,
    /// The judge could not answer; the pattern's only match is the error
    /// message.
    LlmError,
    /// A judge-assigned classification. The stored string is the full tag
    /// including the `llm_` prefix.
    Llm(String),
}

impl PatternKind {
    /// Build the judge-classification kind from the judge's `attack_type`.
    /// Empty or `"none"` types collapse to the generic `llm_classification`.
    pub fn llm(attack_type: &str) -> Self {
        if attack_type.is_empty() || attack_type == "none" {
            Self::Llm("llm_classification".to_string())
        } else {
            Self::Llm(format!("llm_{attack_type}"))
        }
    }

    /// The stable string identifier for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::RoleInjectionSpecialToken => "role_injection_special_token",
            Self::RoleInjectionXmlTag => "role_injection_xml_tag",
            Self::RoleInjectionRoleSwitch => "role_injection_role_switch",
            Self::RoleInjectionConversation => "role_injection_conversation",
            Self::PromptLeakSystemPrompt => "prompt_leak_system_prompt",
            Self::PromptLeakInstructions => "prompt_leak_instructions",
            Self::PromptLeakRepeat => "prompt_leak_repeat",
            Self::PromptLeakConfig => "prompt_leak_config",
            Self::PromptLeakFormatIndirect => "prompt_leak_format_indirect",
            Self::PromptLeakCompletionTrick => "prompt_leak_completion_trick",
            Self::PromptLeakAuthorityOverride => "prompt_leak_authority_override",
            Self::InstructionOverrideTemporal => "instruction_override_temporal",
            Self::InstructionOverrideDirect => "instruction_override_direct",
            Self::InstructionOverrideDelimiter => "instruction_override_delimiter",
            Self::InstructionOverridePriority => "instruction_override_priority",
            Self::InstructionOverrideReset => "instruction_override_reset",
            Self::InstructionOverrideMultistep => "instruction_override_multistep",
            Self::ObfuscationBase64 => "obfuscation_base64",
            Self::ObfuscationHex => "obfuscation_hex",
            Self::ObfuscationUnicodeEscape => "obfuscation_unicode_escape",
            Self::ObfuscationExcessiveSpecial => "obfuscation_excessive_special",
            Self::ObfuscationZeroWidth => "obfuscation_zero_width",
            Self::ObfuscationHomoglyph => "obfuscation_homoglyph",
            Self::DelimiterSystemBoundary => "delimiter_system_boundary",
            Self::DelimiterSqlStyle => "delimiter_sql_style",
            Self::DelimiterCodeComment => "delimiter_code_comment",
            Self::DelimiterExcessive => "delimiter_excessive",
            Self::NormalizationCharacterObfuscation => "normalization_character_obfuscation",
            Self::NormalizationSuspiciousFormatting => "normalization_suspicious_formatting",
            Self::EntropyHighRandomness => "entropy_high_randomness",
            Self::PerplexityUnnaturalText => "perplexity_unnatural_text",
            Self::PerplexityConsonantClusters => "perplexity_consonant_clusters",
            Self::PerplexityGibberishSequence => "perplexity_gibberish_sequence",
            Self::PerplexityGibberish => "perplexity_gibberish",
            Self::TokenUnicodeMixing => "token_unicode_mixing",
            Self::TokenExcessiveSpecialChars => "token_excessive_special_chars",
            Self::TokenExcessiveDigits => "token_excessive_digits",
            Self::TokenZeroWidthSpam => "token_zero_width_spam",
            Self::TokenRepetitionPattern => "token_repetition_pattern",
            Self::LlmError => "llm_error",
            Self::Llm(tag) => tag,
        }
    }

    /// Parse the string form back into a kind. Unknown `llm_`-prefixed tags
    /// become [`PatternKind::Llm`]; anything else unknown is rejected.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "role_injection_special_token" => Self::RoleInjectionSpecialToken,
            "role_injection_xml_tag" => Self::RoleInjectionXmlTag,
            "role_injection_role_switch" => Self::RoleInjectionRoleSwitch,
            "role_injection_conversation" => Self::RoleInjectionConversation,
            "prompt_leak_system_prompt" => Self::PromptLeakSystemPrompt,
            "prompt_leak_instructions" => Self::PromptLeakInstructions,
            "prompt_leak_repeat" => Self::PromptLeakRepeat,
            "prompt_leak_config" => Self::PromptLeakConfig,
            "prompt_leak_format_indirect" => Self::PromptLeakFormatIndirect,
            "prompt_leak_completion_trick" => Self::PromptLeakCompletionTrick,
            "prompt_leak_authority_override" => Self::PromptLeakAuthorityOverride,
            "instruction_override_temporal" => Self::InstructionOverrideTemporal,
            "instruction_override_direct" => Self::InstructionOverrideDirect,
            "instruction_override_delimiter" => Self::InstructionOverrideDelimiter,
            "instruction_override_priority" => Self::InstructionOverridePriority,
            "instruction_override_reset" => Self::InstructionOverrideReset,
            "instruction_override_multistep" => Self::InstructionOverrideMultistep,
            "obfuscation_base64" => Self::ObfuscationBase64,
            "obfuscation_hex" => Self::ObfuscationHex,
            "obfuscation_unicode_escape" => Self::ObfuscationUnicodeEscape,
            "obfuscation_excessive_special" => Self::ObfuscationExcessiveSpecial,
            "obfuscation_zero_width" => Self::ObfuscationZeroWidth,
            "obfuscation_homoglyph" => Self::ObfuscationHomoglyph,
            "delimiter_system_boundary" => Self::DelimiterSystemBoundary,
            "delimiter_sql_style" => Self::DelimiterSqlStyle,
            "delimiter_code_comment" => Self::DelimiterCodeComment,
            "delimiter_excessive" => Self::DelimiterExcessive,
            "normalization_character_obfuscation" => Self::NormalizationCharacterObfuscation,
            "normalization_suspicious_formatting" => Self::NormalizationSuspiciousFormatting,
            "entropy_high_randomness" => Self::EntropyHighRandomness,
            "perplexity_unnatural_text" => Self::PerplexityUnnaturalText,
            "perplexity_consonant_clusters" => Self::PerplexityConsonantClusters,
            "perplexity_gibberish_sequence" => Self::PerplexityGibberishSequence,
            "perplexity_gibberish" => Self::PerplexityGibberish,
            "token_unicode_mixing" => Self::TokenUnicodeMixing,
            "token_excessive_special_chars" => Self::TokenExcessiveSpecialChars,
            "token_excessive_digits" => Self::TokenExcessiveDigits,
            "token_zero_width_spam" => Self::TokenZeroWidthSpam,
            "token_repetition_pattern" => Self::TokenRepetitionPattern,
            "llm_error" => Self::LlmError,
            other if other.starts_with("llm_") => Self::Llm(other.to_string()),
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PatternKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PatternKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Self::from_tag(&tag)
            .ok_or_else(|| D::Error::custom(format!("unknown pattern type: {tag}")))
    }
}

// ---------------------------------------------------------------------------
// Evidence and verdict
// ---------------------------------------------------------------------------

/// One piece of evidence emitted by a detector: which heuristic matched, its
/// score contribution, and the substrings (or short summaries) that
/// triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    /// Contribution in `[0, 1]`, rounded to two decimals on emission.
    pub score: f64,
    pub matches: Vec<String>,
}

/// The verdict produced by one detector, and by the engine after fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// `true` when the risk score stayed below the threshold (0.7 locally;
    /// the configured value after fusion).
    pub safe: bool,
    /// Highest pattern score, in `[0, 1]`.
    pub risk_score: f64,
    /// When patterns fired: how strongly the flag is believed. When nothing
    /// fired: how certain the detector is of innocence.
    pub confidence: f64,
    pub detected_patterns: Vec<DetectedPattern>,
    /// The raw judge payload, present only when the LLM tier ran and
    /// answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_result: Option<JudgeVerdict>,
}

impl DetectionResult {
    /// Assemble a local verdict from accumulated patterns. `safe` derives
    /// from the local 0.7 level; the engine re-derives it from the
    /// configured threshold after fusion.
    pub(crate) fn local(
        detected_patterns: Vec<DetectedPattern>,
        max_score: f64,
        confidence: f64,
    ) -> Self {
        Self {
            safe: max_score < LOCAL_UNSAFE_SCORE,
            risk_score: max_score,
            confidence,
            detected_patterns,
            llm_result: None,
        }
    }

    /// The all-zero verdict returned for cancelled calls.
    pub fn cancelled() -> Self {
        Self {
            safe: true,
            risk_score: 0.0,
            confidence: 0.0,
            detected_patterns: Vec::new(),
            llm_result: None,
        }
    }

    /// The verdict for inputs too short to analyse: safe, zero risk, and a
    /// deliberately middling confidence.
    pub(crate) fn skipped() -> Self {
        Self {
            safe: true,
            risk_score: 0.0,
            confidence: 0.5,
            detected_patterns: Vec::new(),
            llm_result: None,
        }
    }

    /// Convenience helper mirroring the 0.7 local risk level.
    pub fn is_high_risk(&self) -> bool {
        self.risk_score >= LOCAL_UNSAFE_SCORE
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
