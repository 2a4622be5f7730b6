use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use detect_engine::{DetectionMode, EngineConfig, RunMode};
use llm_judge::{providers, ChatJudge, LlmJudge, OutputFormat};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_true")]
    pub role_injection: bool,
    #[serde(default = "default_true")]
    pub prompt_leak: bool,
    #[serde(default = "default_true")]
    pub instruction_override: bool,
    #[serde(default = "default_true")]
    pub obfuscation: bool,
    #[serde(default = "default_true")]
    pub entropy: bool,
    #[serde(default = "default_true")]
    pub perplexity: bool,
    #[serde(default = "default_true")]
    pub token_anomaly: bool,
    #[serde(default = "default_true")]
    pub normalization: bool,
    #[serde(default = "default_true")]
    pub delimiter: bool,
    #[serde(default)]
    pub normalization_mode: DetectionMode,
    #[serde(default)]
    pub delimiter_mode: DetectionMode,
    /// Maximum input length in bytes; 0 means unlimited.
    #[serde(default)]
    pub max_input_length: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            role_injection: true,
            prompt_leak: true,
            instruction_override: true,
            obfuscation: true,
            entropy: true,
            perplexity: true,
            token_anomaly: true,
            normalization: true,
            delimiter: true,
            normalization_mode: DetectionMode::default(),
            delimiter_mode: DetectionMode::default(),
            max_input_length: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    /// The judge tier is opt-in: it adds latency and cost per call.
    #[serde(default)]
    pub enabled: bool,
    /// One of `openai`, `openrouter`, `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Custom endpoint base URL (Ollama only).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub run_mode: RunMode,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            endpoint: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            output_format: OutputFormat::default(),
            run_mode: RunMode::default(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_threshold() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_api_key_env() -> String {
    "PROMPT_WARDEN_API_KEY".to_string()
}

fn default_llm_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// If the file does not exist a default configuration is returned and a
/// warning is emitted, so `prompt-warden check` works out of the box.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(config)
}

/// Translate the file config into an [`EngineConfig`], constructing the
/// judge when the LLM section is enabled.
pub fn build_engine_config(config: &Config) -> anyhow::Result<EngineConfig> {
    let detection = &config.detection;

    let mut engine = EngineConfig::default()
        .threshold(detection.threshold)
        .role_injection(detection.role_injection)
        .prompt_leak(detection.prompt_leak)
        .instruction_override(detection.instruction_override)
        .obfuscation(detection.obfuscation)
        .entropy(detection.entropy)
        .perplexity(detection.perplexity)
        .token_anomaly(detection.token_anomaly)
        .normalization(detection.normalization)
        .delimiter(detection.delimiter)
        .normalization_mode(detection.normalization_mode)
        .delimiter_mode(detection.delimiter_mode)
        .max_input_length(detection.max_input_length);

    if config.llm.enabled {
        let judge = build_judge(&config.llm)?;
        engine = engine.llm(judge, config.llm.run_mode);
    }

    Ok(engine)
}

fn build_judge(llm: &LlmConfig) -> anyhow::Result<Arc<dyn LlmJudge>> {
    let api_key = std::env::var(&llm.api_key_env).unwrap_or_default();

    let judge: ChatJudge = match llm.provider.as_str() {
        "openai" => providers::openai(api_key, llm.model.as_str()),
        "openrouter" => providers::openrouter(api_key, llm.model.as_str()),
        "ollama" => match &llm.endpoint {
            Some(endpoint) => providers::ollama_at(endpoint, llm.model.as_str()),
            None => providers::ollama(llm.model.as_str()),
        },
        other => anyhow::bail!("unknown LLM provider: {other}"),
    };

    let judge = judge
        .output_format(llm.output_format)
        .timeout(Duration::from_secs(llm.timeout_secs));

    Ok(Arc::new(judge))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: Config = serde_yml::from_str("{}").unwrap();
        assert_eq!(config.detection.threshold, 0.7);
        assert!(config.detection.role_injection);
        assert!(!config.llm.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_yaml_merges_with_defaults() {
        let yaml = r#"
detection:
  threshold: 0.85
  delimiter_mode: aggressive
llm:
  enabled: true
  provider: openai
  model: gpt-4o-mini
  run_mode: conditional
"#;
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.detection.threshold, 0.85);
        assert_eq!(config.detection.delimiter_mode, DetectionMode::Aggressive);
        assert!(config.detection.prompt_leak, "unset toggles stay enabled");
        assert!(config.llm.enabled);
        assert_eq!(config.llm.run_mode, RunMode::Conditional);
    }

    #[test]
    fn engine_config_respects_toggles() {
        let yaml = r#"
detection:
  role_injection: false
  max_input_length: 4096
"#;
        let config: Config = serde_yml::from_str(yaml).unwrap();
        let engine_config = build_engine_config(&config).unwrap();
        let engine = detect_engine::DetectionEngine::new(engine_config);
        assert_eq!(engine.detector_count(), 8);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let llm = LlmConfig {
            enabled: true,
            provider: "telepathy".to_string(),
            ..LlmConfig::default()
        };
        assert!(build_judge(&llm).is_err());
    }
}
