//! LLM integration for Fit Coach.
//!
//! Supports:
//! - **OpenRouter**: default backend, via rig-core
//! - **OpenAI**: direct API access via rig-core
//! - **Anthropic**: direct API access via rig-core
//!
//! The `RigAdapter` bridges rig's `CompletionModel` trait to our
//! `LlmProvider` trait.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenRouter,
    OpenAi,
    Anthropic,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenRouter => "qwen/qwen2.5-vl-72b-instruct:free",
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Ok(Self::OpenRouter),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!(
                "unknown backend '{other}' (expected openrouter, openai or anthropic)"
            )),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::OpenRouter => create_openrouter_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
        LlmBackend::Anthropic => create_anthropic_provider(config),
    }
}

fn client_error(provider: &str, e: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: format!("Failed to create {provider} client: {e}"),
    }
}

fn create_openrouter_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openrouter;

    let client: openrouter::Client = openrouter::Client::new(config.api_key.expose_secret())
        .map_err(|e| client_error("openrouter", e))?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenRouter (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error("openai", e))?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error("anthropic", e))?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: LlmBackend, model: &str) -> LlmConfig {
        LlmConfig {
            backend,
            api_key: secrecy::SecretString::from("test-key"),
            model: model.to_string(),
        }
    }

    #[test]
    fn backend_parsing() {
        assert_eq!("OpenRouter".parse::<LlmBackend>(), Ok(LlmBackend::OpenRouter));
        assert_eq!(" anthropic ".parse::<LlmBackend>(), Ok(LlmBackend::Anthropic));
        assert!("ollama".parse::<LlmBackend>().is_err());
        assert_eq!(LlmBackend::OpenAi.as_str(), "openai");
    }

    #[test]
    fn providers_construct_without_network() {
        // Clients accept any string as API key at construction time; auth
        // failures only surface on the first request.
        for (backend, model) in [
            (LlmBackend::OpenRouter, "qwen/qwen2.5-vl-72b-instruct:free"),
            (LlmBackend::OpenAi, "gpt-4o"),
            (LlmBackend::Anthropic, "claude-3-5-sonnet-latest"),
        ] {
            let provider = create_provider(&config(backend, model)).unwrap();
            assert_eq!(provider.model_name(), model);
        }
    }

    #[test]
    fn request_defaults() {
        let req = CompletionRequest::new("sys", "user");
        assert_eq!(req.max_tokens, DEFAULT_MAX_TOKENS);
        assert!((req.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(req.with_max_tokens(10).max_tokens, 10);
    }
}
