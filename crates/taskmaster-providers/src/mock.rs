//! Mock provider for testing the inference pipeline.
//!
//! Allows defining canned responses for specific prompts, injecting request
//! and construction failures, and inspecting call history, so the whole
//! pipeline can be exercised without real API calls.

use core::cmp::Reverse;
use core::time::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::sleep;

use taskmaster_core::{
    Completion, Error, IgnoreLock as _, ModelProvider, Prompt, ProviderFactory, Result,
    TokenUsage,
};

/// Response storage type
type ResponseMap = Arc<Mutex<HashMap<String, String>>>;

/// Model name reported when a mock is used without a factory.
const DEFAULT_MOCK_MODEL: &str = "mock-model";

/// Mock provider that returns pre-defined responses based on prompt patterns.
///
/// Clones share responses and call history.
#[derive(Clone)]
pub struct MockProvider {
    /// Model this instance is bound to
    model: String,
    /// Predefined responses keyed by a substring of the user message
    responses: ResponseMap,
    /// Default response if no pattern matches
    default_response: Arc<Mutex<Option<String>>>,
    /// Error message returned by every call, if set
    failure: Arc<Mutex<Option<String>>>,
    /// Artificial latency before answering
    delay: Arc<Mutex<Option<Duration>>>,
    /// User messages received, in order
    call_history: Arc<Mutex<Vec<String>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider with no canned responses.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MOCK_MODEL.to_owned(),
            responses: Arc::new(Mutex::new(HashMap::new())),
            default_response: Arc::new(Mutex::new(None)),
            failure: Arc::new(Mutex::new(None)),
            delay: Arc::new(Mutex::new(None)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a pattern-based response.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses
            .lock_ignore_poison()
            .insert(pattern.into(), response.into());
        self
    }

    /// Set a default response for prompts that don't match any pattern.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *self.default_response.lock_ignore_poison() = Some(response.into());
        self
    }

    /// Make every call fail with a provider error carrying `message`.
    #[must_use]
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        *self.failure.lock_ignore_poison() = Some(message.into());
        self
    }

    /// Delay every answer by `delay`.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock_ignore_poison() = Some(delay);
        self
    }

    /// Returns a handle bound to `model` that shares this mock's state.
    #[must_use]
    pub fn for_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// Get the call history (user messages of all calls made).
    #[must_use]
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock_ignore_poison().clone()
    }

    /// Get the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock_ignore_poison().len()
    }

    /// Find a matching response for the given user message.
    fn find_response(&self, user_message: &str) -> Option<String> {
        let responses = self.responses.lock_ignore_poison();
        let mut matches: Vec<_> = responses
            .iter()
            .filter(|(pattern, _)| user_message.contains(pattern.as_str()))
            .collect();
        // Longest pattern wins so overlapping patterns are deterministic
        matches.sort_by_key(|(pattern, _)| Reverse(pattern.len()));
        matches.first().map(|(_, response)| (*response).clone())
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt, _max_tokens: u32) -> Result<Completion> {
        self.call_history
            .lock_ignore_poison()
            .push(prompt.user.clone());

        let delay = *self.delay.lock_ignore_poison();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let failure = self.failure.lock_ignore_poison().clone();
        if let Some(message) = failure {
            return Err(Error::Provider(message));
        }

        let text = self.find_response(&prompt.user).unwrap_or_else(|| {
            self.default_response
                .lock_ignore_poison()
                .clone()
                .unwrap_or_else(|| format!("Mock response for prompt: {}", prompt.user))
        });

        Ok(Completion {
            tokens_used: TokenUsage {
                input: (prompt.system.len() + prompt.user.len()) as u64 / 4,
                output: text.len() as u64 / 4,
            },
            text,
            model: self.model.clone(),
            latency_ms: delay.map_or(0, |delay| delay.as_millis() as u64),
        })
    }
}

/// Factory handing out [`MockProvider`] handles that share one mock's state.
pub struct MockProviderFactory {
    /// Shared mock state
    provider: MockProvider,
    /// Models whose construction fails
    failing_models: HashSet<String>,
    /// Models successfully constructed, in order
    built: Mutex<Vec<String>>,
}

impl MockProviderFactory {
    /// Creates a factory around `provider`.
    #[must_use]
    pub fn new(provider: MockProvider) -> Self {
        Self {
            provider,
            failing_models: HashSet::new(),
            built: Mutex::new(Vec::new()),
        }
    }

    /// Makes construction fail for `model`.
    #[must_use]
    pub fn failing_model(mut self, model: impl Into<String>) -> Self {
        self.failing_models.insert(model.into());
        self
    }

    /// Models constructed so far.
    #[must_use]
    pub fn built_models(&self) -> Vec<String> {
        self.built.lock_ignore_poison().clone()
    }

    /// The shared mock, for call assertions.
    #[must_use]
    pub fn provider(&self) -> &MockProvider {
        &self.provider
    }
}

impl ProviderFactory for MockProviderFactory {
    fn build(&self, model: &str) -> Result<Arc<dyn ModelProvider>> {
        if self.failing_models.contains(model) {
            return Err(Error::Config(format!(
                "Mock construction failure for model {model}"
            )));
        }
        self.built.lock_ignore_poison().push(model.to_owned());
        Ok(Arc::new(self.provider.for_model(model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmaster_core::build_breakdown_prompt;

    fn prompt(title: &str) -> Prompt {
        build_breakdown_prompt(title, None)
    }

    #[tokio::test]
    async fn test_mock_provider_substring_match() {
        let provider = MockProvider::new().with_response("wedding", r#"{"subtasks": []}"#);

        let completion = provider
            .complete(&prompt("Plan my sister's wedding"), 100)
            .await
            .unwrap();
        assert_eq!(completion.text, r#"{"subtasks": []}"#);
    }

    #[tokio::test]
    async fn test_mock_provider_prefers_longest_pattern() {
        let provider = MockProvider::new()
            .with_response("taxes", "short")
            .with_response("file taxes", "long");

        let completion = provider.complete(&prompt("Go file taxes"), 100).await.unwrap();
        assert_eq!(completion.text, "long");
    }

    #[tokio::test]
    async fn test_mock_provider_default_response() {
        let provider = MockProvider::new().with_default_response("Default response");

        let completion = provider.complete(&prompt("unmatched"), 100).await.unwrap();
        assert_eq!(completion.text, "Default response");
        assert_eq!(completion.model, DEFAULT_MOCK_MODEL);
    }

    #[tokio::test]
    async fn test_mock_provider_failure_is_recorded() {
        let provider = MockProvider::new().with_failure("boom");

        let error = provider.complete(&prompt("anything"), 100).await.unwrap_err();
        assert!(matches!(error, Error::Provider(ref message) if message == "boom"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_factory_handles_share_history() {
        let factory = MockProviderFactory::new(MockProvider::new().with_default_response("{}"));

        let first = factory.build("model-a").unwrap();
        let second = factory.build("model-b").unwrap();
        first.complete(&prompt("first task"), 10).await.unwrap();
        second.complete(&prompt("second task"), 10).await.unwrap();

        assert_eq!(second.model(), "model-b");
        assert_eq!(factory.provider().call_count(), 2);
        assert_eq!(factory.built_models(), ["model-a", "model-b"]);
    }

    #[test]
    fn test_factory_failing_model() {
        let factory = MockProviderFactory::new(MockProvider::new()).failing_model("broken");
        assert!(matches!(factory.build("broken"), Err(Error::Config(_))));
        assert!(factory.built_models().is_empty());
    }
}
