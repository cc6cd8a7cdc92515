//! Attest LLM Provider Layer
//!
//! The backend boundary of the extraction pipeline: given a prompt and an
//! optional schema, a provider returns free-form text that is *expected* to
//! contain a JSON array. Nothing here assumes the text is well-formed; that
//! is the response validator's job.
//!
//! # Providers
//!
//! - `MockProvider`: Deterministic, scriptable mock for testing
//! - `OllamaProvider`: Local Ollama API integration
//!
//! # Failure handling
//!
//! Every failure is a classified [`BackendError`]. [`with_retry`] retries
//! transient kinds with exponential backoff under a [`RetryPolicy`].
//!
//! # Examples
//!
//! ```
//! use attest_llm::{GenerationRequest, LlmProvider, MockProvider};
//!
//! # tokio_test::block_on(async {
//! let provider = MockProvider::new("[]");
//! let generation = provider.generate(&GenerationRequest::new("test prompt")).await.unwrap();
//! assert_eq!(generation.text, "[]");
//! # });
//! ```

#![warn(missing_docs)]

mod error;
pub mod ollama;
mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub use error::{BackendError, BackendErrorKind};
pub use ollama::OllamaProvider;
pub use retry::{with_retry, RetryPolicy};

/// A single generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Full prompt text
    pub prompt: String,

    /// JSON schema the response should follow, if the provider supports it
    pub schema: Option<String>,

    /// Maximum completion tokens
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl GenerationRequest {
    /// Create a request with default limits
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            schema: None,
            max_tokens: 4096,
            temperature: 0.0,
        }
    }

    /// Attach a response schema
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the completion token limit
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input_tokens: u64,
    /// Completion tokens
    pub output_tokens: u64,
    /// Tokens written to the provider's prompt cache
    pub cache_write_tokens: u64,
    /// Tokens read from the provider's prompt cache
    pub cache_read_tokens: u64,
}

/// Raw provider output
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Response text, unvalidated
    pub text: String,
    /// Model that produced it
    pub model: String,
    /// Token usage
    pub usage: TokenUsage,
}

/// A generative text backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Name of the model requests are sent to
    fn model_name(&self) -> &str;

    /// Generate a completion
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError>;
}

#[async_trait]
impl<P: LlmProvider + ?Sized> LlmProvider for Arc<P> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        (**self).generate(request).await
    }
}

#[derive(Debug, Default)]
struct MockState {
    responses: Vec<(String, String)>,
    errors: Vec<(String, BackendError)>,
    queued_failures: Vec<BackendError>,
    delays: Vec<(String, Duration)>,
    call_count: usize,
    prompts: Vec<String>,
}

/// Mock LLM provider for deterministic testing
///
/// Returns pre-configured responses without making any network calls.
/// Responses, errors and delays are keyed by a substring of the prompt, so a
/// test can script the behaviour of individual chunks of a document.
///
/// # Examples
///
/// ```
/// use attest_llm::{BackendError, GenerationRequest, LlmProvider, MockProvider};
///
/// # tokio_test::block_on(async {
/// let provider = MockProvider::new("default");
/// provider.add_response("alpha", "response for alpha");
/// provider.add_error("broken", BackendError::request("bad request"));
///
/// let out = provider.generate(&GenerationRequest::new("... alpha ...")).await.unwrap();
/// assert_eq!(out.text, "response for alpha");
/// assert!(provider.generate(&GenerationRequest::new("broken")).await.is_err());
/// assert_eq!(provider.call_count(), 2);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    model: String,
    default_response: String,
    usage: TokenUsage,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            model: "mock-model".to_string(),
            default_response: response.into(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
                ..TokenUsage::default()
            },
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Report a different model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Report different token usage per call
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not wedge the other tests sharing the mock
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Respond with `response` to prompts containing `pattern`
    pub fn add_response(&self, pattern: impl Into<String>, response: impl Into<String>) {
        self.state().responses.push((pattern.into(), response.into()));
    }

    /// Always fail prompts containing `pattern`
    pub fn add_error(&self, pattern: impl Into<String>, error: BackendError) {
        self.state().errors.push((pattern.into(), error));
    }

    /// Fail the next call (whatever its prompt) with `error`; queued failures are used in order
    pub fn fail_next(&self, error: BackendError) {
        self.state().queued_failures.push(error);
    }

    /// Delay responses to prompts containing `pattern`
    pub fn add_delay(&self, pattern: impl Into<String>, delay: Duration) {
        self.state().delays.push((pattern.into(), delay));
    }

    /// Get the number of times generate was called
    pub fn call_count(&self) -> usize {
        self.state().call_count
    }

    /// Reset the call count and recorded prompts
    pub fn reset_call_count(&self) {
        let mut state = self.state();
        state.call_count = 0;
        state.prompts.clear();
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.state().prompts.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("[]")
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, BackendError> {
        let prompt = request.prompt.as_str();

        // Decide the outcome under the lock, then release it before sleeping
        let (delay, outcome) = {
            let mut state = self.state();
            state.call_count += 1;
            state.prompts.push(prompt.to_string());

            let delay = state
                .delays
                .iter()
                .find(|(pattern, _)| prompt.contains(pattern.as_str()))
                .map(|(_, d)| *d);

            let outcome = if !state.queued_failures.is_empty() {
                Err(state.queued_failures.remove(0))
            } else if let Some((_, err)) = state
                .errors
                .iter()
                .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            {
                Err(err.clone())
            } else {
                let text = state
                    .responses
                    .iter()
                    .find(|(pattern, _)| prompt.contains(pattern.as_str()))
                    .map(|(_, response)| response.clone())
                    .unwrap_or_else(|| self.default_response.clone());
                Ok(text)
            };
            (delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        outcome.map(|text| Generation {
            text,
            model: self.model.clone(),
            usage: self.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(prompt: &str) -> GenerationRequest {
        GenerationRequest::new(prompt)
    }

    #[tokio::test]
    async fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        let result = provider.generate(&req("any prompt")).await.unwrap();
        assert_eq!(result.text, "Test response");
        assert_eq!(result.model, "mock-model");
        assert_eq!(result.usage.input_tokens, 100);
    }

    #[tokio::test]
    async fn test_mock_provider_specific_responses() {
        let provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_response("foo", "bar");

        assert_eq!(provider.generate(&req("say hello")).await.unwrap().text, "world");
        assert_eq!(provider.generate(&req("foo?")).await.unwrap().text, "bar");
        assert_eq!(provider.generate(&req("unknown")).await.unwrap().text, "[]");
    }

    #[tokio::test]
    async fn test_mock_provider_call_count() {
        let provider = MockProvider::new("test");
        assert_eq!(provider.call_count(), 0);

        provider.generate(&req("prompt1")).await.unwrap();
        provider.generate(&req("prompt2")).await.unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.prompts(), vec!["prompt1", "prompt2"]);

        provider.reset_call_count();
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_provider_pattern_error() {
        let provider = MockProvider::default();
        provider.add_error("bad prompt", BackendError::auth("revoked"));

        let result = provider.generate(&req("a bad prompt")).await;
        assert_eq!(result.unwrap_err().kind, BackendErrorKind::Auth);
        assert!(provider.generate(&req("good prompt")).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_provider_queued_failures_in_order() {
        let provider = MockProvider::new("ok");
        provider.fail_next(BackendError::rate_limit("busy", None));
        provider.fail_next(BackendError::network("reset"));

        assert_eq!(provider.generate(&req("x")).await.unwrap_err().kind, BackendErrorKind::RateLimit);
        assert_eq!(provider.generate(&req("x")).await.unwrap_err().kind, BackendErrorKind::Network);
        assert_eq!(provider.generate(&req("x")).await.unwrap().text, "ok");
    }

    #[test]
    fn test_mock_provider_clone_shares_state() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();

        tokio_test::block_on(provider1.generate(&req("test"))).unwrap();

        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);
    }

    #[tokio::test]
    async fn test_arc_provider_delegates() {
        let provider = Arc::new(MockProvider::new("shared"));
        let out = LlmProvider::generate(&provider, &req("p")).await.unwrap();
        assert_eq!(out.text, "shared");
        assert_eq!(LlmProvider::model_name(&provider), "mock-model");
    }

    #[test]
    fn test_request_builder() {
        let r = GenerationRequest::new("p").with_schema("{}").with_max_tokens(10);
        assert_eq!(r.schema.as_deref(), Some("{}"));
        assert_eq!(r.max_tokens, 10);
    }
}
