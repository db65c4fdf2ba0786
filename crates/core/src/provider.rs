//! Language model and embedder traits: the abstraction over LLM backends.
//!
//! The engine uses a model for short auxiliary tasks (yes/no decisions,
//! query reformulation, translation, summaries); the final generation call
//! belongs to the caller and is out of scope here.
//!
//! Implementations: OpenAI-compatible endpoints (OpenAI, OpenRouter, Ollama, custom).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A single text-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Fully rendered prompt text
    pub prompt: String,

    /// Maximum tokens to generate
    pub max_tokens: usize,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.1
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature: default_temperature(),
            stop: Vec::new(),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response from a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,

    /// Which model actually responded
    pub model: String,

    pub usage: Option<Usage>,
}

/// A text-generation backend.
///
/// The engine holds one immutable reference per request and never reaches
/// for a process-wide model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A human-readable name (e.g., "openrouter", "ollama").
    fn name(&self) -> &str;

    /// The model identifier, used in "(model)" history headers.
    fn model_id(&self) -> &str;

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationResponse, ProviderError>;
}

/// Produces embedding vectors for texts.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, in order.
    async fn embed(&self, inputs: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_request_defaults() {
        let req = GenerationRequest::new("hello", 64);
        assert_eq!(req.max_tokens, 64);
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
        assert!(req.stop.is_empty());
    }

    #[test]
    fn generation_request_deserializes_default_temperature() {
        let req: GenerationRequest =
            serde_json::from_str(r#"{"prompt":"p","max_tokens":8}"#).unwrap();
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
    }
}
