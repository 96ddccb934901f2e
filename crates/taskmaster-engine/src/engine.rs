use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{info, warn};

use taskmaster_core::{
    BreakdownResult, Clock, Error, Inference, InferencePayload, InferenceStatus, ModelSettings,
    PriorityResult, Prompt, ProviderFactory, Result, SystemClock, TokenUsage,
    build_breakdown_prompt, build_priority_prompt,
};
use taskmaster_providers::ModelClient;

use crate::parser::{parse_breakdown, parse_priority};

/// Runs assistant operations end to end: prompt, model call, parse.
///
/// The engine holds no per-request state. Each call renders its own prompt
/// and connects its own [`ModelClient`], so one engine can serve concurrent
/// requests.
pub struct InferenceEngine {
    settings: Arc<ModelSettings>,
    factory: Arc<dyn ProviderFactory>,
    clock: Arc<dyn Clock>,
}

impl InferenceEngine {
    /// Creates an engine that reads dates from the system clock.
    pub fn new(settings: Arc<ModelSettings>, factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            settings,
            factory,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for prompt date defaults.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current date according to the engine's clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Model settings this engine connects with.
    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Splits a task into ordered subtasks with time estimates.
    ///
    /// Never fails: provider or parse failures yield an empty subtask list
    /// whose reasoning carries the error text.
    pub async fn analyze_task_for_breakdown(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Inference<BreakdownResult> {
        let prompt = build_breakdown_prompt(title, description);
        self.run(prompt, parse_breakdown, "Unable to break down the task")
            .await
    }

    /// Suggests a priority for a task.
    ///
    /// An absent due date is treated as due today. Never fails: provider or
    /// parse failures yield `medium` with zero confidence and the error text
    /// in the reasoning.
    pub async fn suggest_priority(
        &self,
        title: &str,
        description: Option<&str>,
        due_date: Option<NaiveDate>,
    ) -> Inference<PriorityResult> {
        let prompt = build_priority_prompt(title, description, due_date, self.today());
        self.run(prompt, parse_priority, "Unable to suggest a priority")
            .await
    }

    async fn run<T: InferencePayload>(
        &self,
        prompt: Prompt,
        parse: fn(&str) -> Result<T>,
        failure_context: &str,
    ) -> Inference<T> {
        let client = match ModelClient::connect(self.factory.as_ref(), &self.settings) {
            Ok(client) => client,
            Err(error) => {
                return degraded(
                    &error,
                    failure_context,
                    prompt,
                    None,
                    0,
                    TokenUsage::default(),
                );
            }
        };

        let start = Instant::now();
        let (outcome, tokens_used) = match client.complete(&prompt).await {
            Ok(completion) => (parse(&completion.text), completion.tokens_used),
            Err(error) => (Err(error), TokenUsage::default()),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                info!(
                    endpoint = %T::ENDPOINT,
                    model = client.model(),
                    used_fallback = client.used_fallback(),
                    latency_ms,
                    tokens = tokens_used.total(),
                    "Inference completed"
                );
                Inference {
                    result: result.finalize(),
                    status: InferenceStatus::Ok,
                    prompt,
                    model: Some(client.model().to_owned()),
                    used_fallback: client.used_fallback(),
                    latency_ms,
                    tokens_used,
                }
            }
            Err(error) => degraded(
                &error,
                failure_context,
                prompt,
                Some(&client),
                latency_ms,
                tokens_used,
            ),
        }
    }
}

/// Builds the conservative result returned in place of an error.
///
/// `client` is `None` when neither model could be constructed.
fn degraded<T: InferencePayload>(
    error: &Error,
    failure_context: &str,
    prompt: Prompt,
    client: Option<&ModelClient>,
    latency_ms: u64,
    tokens_used: TokenUsage,
) -> Inference<T> {
    let message = error.to_string();
    let model = client.map(|connected| connected.model().to_owned());
    warn!(
        endpoint = %T::ENDPOINT,
        model = model.as_deref().unwrap_or("none"),
        kind = %error.kind(),
        latency_ms,
        error = %message,
        "Inference degraded"
    );

    Inference {
        result: T::degraded(format!("{failure_context}: {message}")),
        status: InferenceStatus::Degraded {
            kind: error.kind(),
            message,
        },
        prompt,
        model,
        used_fallback: client.is_some_and(ModelClient::used_fallback),
        latency_ms,
        tokens_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmaster_core::{ErrorKind, FixedClock, Priority};
    use taskmaster_providers::{MockProvider, MockProviderFactory};

    fn settings() -> Arc<ModelSettings> {
        Arc::new(ModelSettings {
            primary: "primary-model".to_owned(),
            fallback: "fallback-model".to_owned(),
            max_tokens: 512,
            temperature: 0.0,
            timeout: core::time::Duration::from_secs(5),
        })
    }

    fn engine(factory: MockProviderFactory) -> InferenceEngine {
        let today = NaiveDate::from_ymd_opt(2025, 4, 15).unwrap();
        InferenceEngine::new(settings(), Arc::new(factory)).with_clock(Arc::new(FixedClock(today)))
    }

    #[tokio::test]
    async fn test_construction_failure_of_both_models_degrades() {
        let factory = MockProviderFactory::new(MockProvider::new())
            .failing_model("primary-model")
            .failing_model("fallback-model");

        let inference = engine(factory).suggest_priority("File taxes", None, None).await;

        assert_eq!(inference.result.suggested_priority, Priority::Medium);
        assert!(inference.result.confidence.abs() < f64::EPSILON);
        assert_eq!(inference.error_kind(), Some(ErrorKind::Configuration));
        assert_eq!(inference.model, None);
        assert!(inference.result.reasoning.contains("fallback-model"));
    }

    #[tokio::test]
    async fn test_missing_reasoning_is_filled_after_parse() {
        let factory = MockProviderFactory::new(
            MockProvider::new().with_default_response(r#"{"subtasks": [{"title": "Shop", "estimated_time": 30}]}"#),
        );

        let inference = engine(factory)
            .analyze_task_for_breakdown("Host a dinner party", None)
            .await;

        assert!(!inference.is_degraded());
        assert_eq!(inference.result.subtasks.len(), 1);
        assert_eq!(
            inference.result.reasoning,
            taskmaster_core::types::DEFAULT_BREAKDOWN_REASONING
        );
    }

    #[tokio::test]
    async fn test_priority_prompt_uses_engine_clock() {
        let provider = MockProvider::new().with_default_response(
            r#"{"suggested_priority": "low", "confidence": 0.4, "reasoning": "No deadline."}"#,
        );
        let factory = MockProviderFactory::new(provider.clone());

        engine(factory).suggest_priority("Water the plants", None, None).await;

        let history = provider.get_call_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].contains("2025-04-15"), "prompt was: {}", history[0]);
    }

    #[tokio::test]
    async fn test_inference_carries_the_prompt_it_sent() {
        let provider = MockProvider::new().with_failure("connection reset");
        let factory = MockProviderFactory::new(provider.clone());
        let due = NaiveDate::from_ymd_opt(2025, 4, 20).unwrap();

        let inference = engine(factory)
            .suggest_priority("Renew passport", Some("Expires in May"), Some(due))
            .await;

        assert!(inference.is_degraded());
        assert_eq!(provider.get_call_history(), [inference.prompt.user.clone()]);
        assert_eq!(
            inference.prompt,
            build_priority_prompt(
                "Renew passport",
                Some("Expires in May"),
                Some(due),
                NaiveDate::from_ymd_opt(2025, 4, 15).unwrap(),
            )
        );
    }
}
