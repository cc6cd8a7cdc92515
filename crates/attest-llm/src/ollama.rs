//! Ollama Provider Implementation
//!
//! Talks to a local Ollama instance over its `/api/generate` endpoint. When
//! the request carries a schema it is forwarded as Ollama's `format` field,
//! otherwise plain JSON mode is requested.
//!
//! The provider makes exactly one HTTP call per `generate`; retrying is the
//! caller's business (see [`crate::with_retry`]).
//!
//! # Examples
//!
//! ```no_run
//! use attest_llm::{GenerationRequest, LlmProvider, OllamaProvider};
//!
//! # async fn run() -> Result<(), attest_llm::BackendError> {
//! let provider = OllamaProvider::new("http://localhost:11434", "llama3")?;
//! let out = provider.generate(&GenerationRequest::new("List the dates")).await?;
//! println!("{}", out.text);
//! # Ok(())
//! # }
//! ```

use crate::{BackendError, Generation, GenerationRequest, LlmProvider, TokenUsage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default HTTP timeout for a single request (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Ollama API provider for local LLM inference
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: serde_json::Value,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Errors
    ///
    /// Returns a `Request` error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_timeout(endpoint, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a provider with a custom HTTP timeout
    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    /// Provider on the default local endpoint
    pub fn default_endpoint(model: impl Into<String>) -> Result<Self, BackendError> {
        Self::new(DEFAULT_ENDPOINT, model)
    }

    /// Endpoint requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn format_for(request: &GenerationRequest) -> serde_json::Value {
        // A schema that is not valid JSON degrades to plain JSON mode
        request
            .schema
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(|| serde_json::Value::String("json".to_string()))
    }
}

fn classify_transport(err: reqwest::Error) -> BackendError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        BackendError::network(err.to_string())
    } else if let Some(status) = err.status() {
        BackendError::from_status(status.as_u16(), &err.to_string())
    } else {
        BackendError::unknown(err.to_string())
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            format: Self::format_for(request),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        debug!(model = %self.model, prompt_chars = request.prompt.len(), "Sending Ollama request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(BackendError::from_status(status.as_u16(), &text));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::unknown(format!("failed to decode Ollama response: {}", e)))?;

        Ok(Generation {
            text: parsed.response,
            model: self.model.clone(),
            usage: TokenUsage {
                input_tokens: parsed.prompt_eval_count,
                output_tokens: parsed.eval_count,
                ..TokenUsage::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendErrorKind;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new("http://localhost:11434/", "llama3").unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:11434");
        assert_eq!(provider.model_name(), "llama3");
    }

    #[test]
    fn test_ollama_provider_default_endpoint() {
        let provider = OllamaProvider::default_endpoint("mistral").unwrap();
        assert_eq!(provider.endpoint(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_format_uses_schema_when_valid() {
        let req = GenerationRequest::new("p").with_schema(r#"{"type":"array"}"#);
        assert_eq!(OllamaProvider::format_for(&req)["type"], "array");

        let plain = GenerationRequest::new("p");
        assert_eq!(OllamaProvider::format_for(&plain), "json");

        let broken = GenerationRequest::new("p").with_schema("{not json");
        assert_eq!(OllamaProvider::format_for(&broken), "json");
    }

    #[test]
    fn test_response_decodes_token_counts() {
        let raw = r#"{"response":"[]","done":true,"prompt_eval_count":12,"eval_count":3}"#;
        let parsed: OllamaGenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.prompt_eval_count, 12);
        assert_eq!(parsed.eval_count, 3);

        let sparse: OllamaGenerateResponse = serde_json::from_str(r#"{"response":"x"}"#).unwrap();
        assert_eq!(sparse.eval_count, 0);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let provider =
            OllamaProvider::with_timeout("http://127.0.0.1:9", "llama3", Duration::from_secs(2)).unwrap();

        let err = provider.generate(&GenerationRequest::new("test")).await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Network);
    }

    #[tokio::test]
    #[ignore] // Only run when Ollama is available
    async fn test_ollama_generate_integration() {
        let provider = OllamaProvider::default_endpoint("llama3").unwrap();
        let out = provider
            .generate(&GenerationRequest::new("Return an empty JSON array"))
            .await
            .unwrap();
        assert!(!out.text.is_empty());
    }
}
