//! OpenAI-compatible chat-completion judge.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::judge::{JudgeError, JudgeVerdict, LlmJudge, OutputFormat};
use crate::prompts;

/// Default per-call deadline, covering connect, send, and body read.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// ChatJudge
// ---------------------------------------------------------------------------

/// [`LlmJudge`] implementation speaking the OpenAI chat-completion wire
/// format, which OpenAI, OpenRouter, Ollama, and most self-hosted gateways
/// all accept.
///
/// The underlying [`reqwest::Client`] holds a connection pool and is built
/// once per judge; construct the judge at startup and reuse it for every
/// call.
pub struct ChatJudge {
    endpoint: String,
    api_key: String,
    model: String,
    output_format: OutputFormat,
    /// Wholesale override of the built-in system prompt.
    system_prompt: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl ChatJudge {
    /// Create a judge for an arbitrary OpenAI-compatible endpoint.
    ///
    /// `api_key` may be empty, in which case no `Authorization` header is
    /// sent (local Ollama). Defaults: simple output format, built-in system
    /// prompt, 10 second timeout.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            output_format: OutputFormat::Simple,
            system_prompt: None,
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Set the expected output format (default: [`OutputFormat::Simple`]).
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Replace the built-in system prompt wholesale. Useful for
    /// domain-specific judges (banking, healthcare) with their own notion of
    /// what counts as an attack.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the per-call timeout (default: 10 seconds). Increase for slower
    /// models or remote endpoints.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The system prompt that will actually be sent: the override if one was
    /// set, otherwise the built-in prompt for the configured format.
    pub fn effective_system_prompt(&self) -> &str {
        match &self.system_prompt {
            Some(prompt) => prompt,
            None => match self.output_format {
                OutputFormat::Simple => prompts::SIMPLE_SYSTEM_PROMPT,
                OutputFormat::Structured => prompts::STRUCTURED_SYSTEM_PROMPT,
            },
        }
    }

    /// The configured per-call timeout.
    pub fn call_timeout(&self) -> Duration {
        self.timeout
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl LlmJudge for ChatJudge {
    async fn judge(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<JudgeVerdict, JudgeError> {
        // A cancelled call must never reach the network.
        if cancel.is_cancelled() {
            return Err(JudgeError::Cancelled);
        }

        let mut payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.effective_system_prompt()},
                {"role": "user", "content": prompts::wrap_input(input)},
            ],
            "temperature": 1,
        });
        if self.output_format == OutputFormat::Structured {
            payload["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&payload);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        debug!(endpoint = %self.endpoint, model = %self.model, "sending judge request");

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(JudgeError::Cancelled),
            result = request.send() => result.map_err(|err| {
                if err.is_timeout() {
                    JudgeError::Timeout(self.timeout)
                } else {
                    JudgeError::Transport(err)
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(JudgeError::Decode)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(JudgeError::EmptyResponse)?
            .message
            .content;
        let content = content.trim();

        match self.output_format {
            OutputFormat::Simple => parse_simple(content),
            OutputFormat::Structured => parse_structured(content),
        }
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parse a simple-format response: any response containing `ATTACK` (checked
/// first, so a confused `SAFE ATTACK` errs on the cautious side) or `SAFE`
/// yields a fixed-confidence verdict; anything else is a protocol error.
fn parse_simple(content: &str) -> Result<JudgeVerdict, JudgeError> {
    let upper = content.to_uppercase();

    if upper.contains("ATTACK") {
        return Ok(JudgeVerdict {
            is_attack: true,
            confidence: 0.9,
            attack_type: String::new(),
            reasoning: String::new(),
        });
    }
    if upper.contains("SAFE") {
        return Ok(JudgeVerdict {
            is_attack: false,
            confidence: 0.9,
            attack_type: String::new(),
            reasoning: String::new(),
        });
    }

    Err(JudgeError::UnexpectedResponse(content.to_string()))
}

/// Parse a structured-format response. Missing `is_attack` or `confidence`
/// fields are rejected; `attack_type` and `reasoning` default to empty.
fn parse_structured(content: &str) -> Result<JudgeVerdict, JudgeError> {
    serde_json::from_str::<JudgeVerdict>(content).map_err(JudgeError::MalformedJson)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
