//! Convenience constructors for well-known OpenAI-compatible providers.

use crate::chat::ChatJudge;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
const OLLAMA_DEFAULT_BASE: &str = "http://localhost:11434";

/// Judge backed by the OpenAI API.
pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> ChatJudge {
    ChatJudge::new(OPENAI_ENDPOINT, api_key, model)
}

/// Judge backed by the OpenRouter API.
pub fn openrouter(api_key: impl Into<String>, model: impl Into<String>) -> ChatJudge {
    ChatJudge::new(OPENROUTER_ENDPOINT, api_key, model)
}

/// Judge backed by a local Ollama instance on the default port. Ollama does
/// not require an API key.
pub fn ollama(model: impl Into<String>) -> ChatJudge {
    ChatJudge::new(
        format!("{OLLAMA_DEFAULT_BASE}/v1/chat/completions"),
        "",
        model,
    )
}

/// Judge backed by Ollama running at a custom base URL (different host or
/// port), e.g. `http://gpu-box:11434`.
pub fn ollama_at(base_url: impl AsRef<str>, model: impl Into<String>) -> ChatJudge {
    ChatJudge::new(
        format!("{}/v1/chat/completions", base_url.as_ref()),
        "",
        model,
    )
}
