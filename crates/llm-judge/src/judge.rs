//! The judge contract: trait, verdict, and error taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything that can go wrong between the judge and its endpoint.
///
/// None of these abort a detection run: the caller folds them into a
/// diagnostic `llm_error` pattern and carries on with the local verdict.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("judge call timed out after {0:?}")]
    Timeout(Duration),

    #[error("judge call cancelled")]
    Cancelled,

    #[error("judge endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode judge response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("judge response contained no choices")]
    EmptyResponse,

    #[error("unexpected judge response: {0}")]
    UnexpectedResponse(String),

    #[error("failed to parse structured judge response: {0}")]
    MalformedJson(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// The classification an LLM judge returns for one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// `true` when the judge classified the input as an attack.
    pub is_attack: bool,
    /// How certain the judge is, in `[0, 1]`.
    pub confidence: f64,
    /// Taxonomy tag assigned by the judge (`"none"` when benign). Only the
    /// structured output format populates this; treat it as opaque.
    #[serde(default)]
    pub attack_type: String,
    /// Short free-text explanation (structured format only).
    #[serde(default)]
    pub reasoning: String,
}

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

/// What shape of response the judge is prompted to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// A bare `SAFE` / `ATTACK` token. Cheap and fast; no reasoning.
    #[default]
    Simple,
    /// A JSON object with `is_attack`, `confidence`, `attack_type`, and
    /// `reasoning`. Costs more tokens, returns more signal.
    Structured,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// An LLM-backed oracle consulted as an optional detection tier.
///
/// Implementations must honour the cancellation token: a cancelled call must
/// never perform an HTTP request.
#[async_trait]
pub trait LlmJudge: Send + Sync {
    /// Classify `input`, returning the verdict or the reason it could not be
    /// obtained.
    async fn judge(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<JudgeVerdict, JudgeError>;
}
