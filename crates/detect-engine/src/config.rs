//! Engine configuration: thresholds, detector toggles, detection modes, and
//! judge gating.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use llm_judge::LlmJudge;

/// Per-detector strictness for the normalization and delimiter detectors,
/// trading false-positive rate against coverage of subtle obfuscations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Flag only when corroborating signals are present (default).
    #[default]
    Balanced,
    /// Flag on any match. Catches more, false-positives more.
    Aggressive,
}

/// When the LLM judge tier is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// On every input. Most accurate, most expensive.
    #[default]
    Always,
    /// Only when the local detectors land in the uncertain 0.5–0.7 band.
    Conditional,
    /// Only when the local detectors say safe, to catch false negatives.
    Fallback,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Configuration consumed by [`DetectionEngine::new`](crate::DetectionEngine::new).
///
/// Start from [`EngineConfig::default`] and chain the setters:
///
/// ```rust
/// use detect_engine::{DetectionMode, EngineConfig};
///
/// let config = EngineConfig::default()
///     .threshold(0.8)
///     .delimiter_mode(DetectionMode::Aggressive)
///     .max_input_length(10_000);
/// ```
///
/// Setters silently reject out-of-range values, preserving the previous
/// setting, so a config assembled from untrusted sources still ends up
/// well-formed.
#[derive(Clone)]
pub struct EngineConfig {
    pub(crate) threshold: f64,
    pub(crate) role_injection: bool,
    pub(crate) prompt_leak: bool,
    pub(crate) instruction_override: bool,
    pub(crate) obfuscation: bool,
    pub(crate) entropy: bool,
    pub(crate) perplexity: bool,
    pub(crate) token_anomaly: bool,
    pub(crate) normalization: bool,
    pub(crate) delimiter: bool,
    pub(crate) normalization_mode: DetectionMode,
    pub(crate) delimiter_mode: DetectionMode,
    /// Byte cap applied before dispatch; 0 means unlimited.
    pub(crate) max_input_length: usize,
    pub(crate) llm_judge: Option<Arc<dyn LlmJudge>>,
    pub(crate) llm_run_mode: RunMode,
}

impl Default for EngineConfig {
    /// All nine local detectors enabled, threshold 0.7, balanced modes, no
    /// input cap, no judge.
    fn default() -> Self {
        Self {
            threshold: 0.7,
            role_injection: true,
            prompt_leak: true,
            instruction_override: true,
            obfuscation: true,
            entropy: true,
            perplexity: true,
            token_anomaly: true,
            normalization: true,
            delimiter: true,
            normalization_mode: DetectionMode::Balanced,
            delimiter_mode: DetectionMode::Balanced,
            max_input_length: 0,
            llm_judge: None,
            llm_run_mode: RunMode::Always,
        }
    }
}

impl EngineConfig {
    /// Risk score at or above which input is considered unsafe. Values
    /// outside `[0, 1]` are ignored.
    pub fn threshold(mut self, value: f64) -> Self {
        if (0.0..=1.0).contains(&value) {
            self.threshold = value;
        }
        self
    }

    pub fn role_injection(mut self, enabled: bool) -> Self {
        self.role_injection = enabled;
        self
    }

    pub fn prompt_leak(mut self, enabled: bool) -> Self {
        self.prompt_leak = enabled;
        self
    }

    pub fn instruction_override(mut self, enabled: bool) -> Self {
        self.instruction_override = enabled;
        self
    }

    pub fn obfuscation(mut self, enabled: bool) -> Self {
        self.obfuscation = enabled;
        self
    }

    pub fn entropy(mut self, enabled: bool) -> Self {
        self.entropy = enabled;
        self
    }

    pub fn perplexity(mut self, enabled: bool) -> Self {
        self.perplexity = enabled;
        self
    }

    pub fn token_anomaly(mut self, enabled: bool) -> Self {
        self.token_anomaly = enabled;
        self
    }

    pub fn normalization(mut self, enabled: bool) -> Self {
        self.normalization = enabled;
        self
    }

    pub fn delimiter(mut self, enabled: bool) -> Self {
        self.delimiter = enabled;
        self
    }

    pub fn normalization_mode(mut self, mode: DetectionMode) -> Self {
        self.normalization_mode = mode;
        self
    }

    pub fn delimiter_mode(mut self, mode: DetectionMode) -> Self {
        self.delimiter_mode = mode;
        self
    }

    /// Maximum input length in bytes; longer inputs are truncated before
    /// dispatch. 0 means unlimited.
    pub fn max_input_length(mut self, bytes: usize) -> Self {
        self.max_input_length = bytes;
        self
    }

    /// Attach an LLM judge and choose when it runs. Judge calls are expensive
    /// and slow compared to the local detectors, so this is off by default.
    pub fn llm(mut self, judge: Arc<dyn LlmJudge>, mode: RunMode) -> Self {
        self.llm_judge = Some(judge);
        self.llm_run_mode = mode;
        self
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("threshold", &self.threshold)
            .field("role_injection", &self.role_injection)
            .field("prompt_leak", &self.prompt_leak)
            .field("instruction_override", &self.instruction_override)
            .field("obfuscation", &self.obfuscation)
            .field("entropy", &self.entropy)
            .field("perplexity", &self.perplexity)
            .field("token_anomaly", &self.token_anomaly)
            .field("normalization", &self.normalization)
            .field("delimiter", &self.delimiter)
            .field("normalization_mode", &self.normalization_mode)
            .field("delimiter_mode", &self.delimiter_mode)
            .field("max_input_length", &self.max_input_length)
            .field("llm_judge", &self.llm_judge.as_ref().map(|_| "<judge>"))
            .field("llm_run_mode", &self.llm_run_mode)
            .finish()
    }
}
