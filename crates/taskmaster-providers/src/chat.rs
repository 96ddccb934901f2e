use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use taskmaster_core::{
    AssistantSettings, Completion, Error, ModelProvider, Prompt, ProviderFactory, ProviderKind,
    Result, TokenUsage,
};

/// Provider for any OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Backend this provider talks to.
    backend: ProviderKind,
    /// Chat-completions URL.
    endpoint: String,
    /// Bearer token.
    api_key: String,
    /// Model name to use.
    model: String,
    /// Sampling temperature.
    temperature: f32,
}

impl ChatCompletionProvider {
    /// Creates a provider for `model` using resolved settings.
    ///
    /// # Errors
    /// Returns a configuration error if the model identifier is invalid or
    /// the API key is empty.
    pub fn new(client: Client, settings: &AssistantSettings, model: &str) -> Result<Self> {
        validate_model_id(model)?;
        if settings.api_key.is_empty() {
            return Err(Error::MissingApiKey(
                settings.provider.api_key_env().to_owned(),
            ));
        }

        Ok(Self {
            client,
            backend: settings.provider,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: model.to_owned(),
            temperature: settings.models.temperature,
        })
    }

    /// Builds the chat-completions request body.
    fn build_request_body(&self, prompt: &Prompt, max_tokens: u32) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "max_tokens": max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
        })
    }
}

/// Rejects model identifiers that no backend would accept.
fn validate_model_id(model: &str) -> Result<()> {
    if model.is_empty() {
        return Err(Error::Config("Model identifier is empty".to_owned()));
    }
    if !model.chars().all(|character| character.is_ascii_graphic()) {
        return Err(Error::Config(format!(
            "Invalid model identifier: {model:?}"
        )));
    }
    Ok(())
}

/// Response payload returned by chat-completions APIs.
#[derive(Deserialize)]
struct ChatResponse {
    /// List of generated choices.
    choices: Vec<Choice>,
    /// Model that actually served the request, when reported.
    #[serde(default)]
    model: Option<String>,
    /// Optional token usage statistics returned by the service.
    #[serde(default)]
    usage: Option<Usage>,
}

/// Individual completion choice.
#[derive(Deserialize)]
struct Choice {
    /// Message payload representing the completion text.
    message: Message,
}

/// Message structure containing generated content.
#[derive(Deserialize)]
struct Message {
    /// Text content produced by the model; null for refusals.
    content: Option<String>,
}

/// Token accounting information for a response.
#[derive(Deserialize)]
struct Usage {
    /// Number of prompt tokens billed for the request.
    #[serde(default)]
    prompt_tokens: u64,
    /// Number of completion tokens returned by the model.
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl ModelProvider for ChatCompletionProvider {
    fn name(&self) -> &'static str {
        match self.backend {
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Groq => "groq",
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion> {
        let start = Instant::now();
        let request_body = self.build_request_body(prompt, max_tokens);

        let mut request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body);
        if self.backend == ProviderKind::OpenRouter {
            request = request.header("X-Title", "TaskMaster Assistant");
        }

        let response = request
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "{} API request failed with status {status}: {error_text}",
                self.name()
            )));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|err| Error::Provider(format!("Failed to decode response: {err}")))?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| Error::Provider(format!("No completion text from {}", self.name())))?;

        let tokens_used = api_response
            .usage
            .map_or_else(TokenUsage::default, |usage| TokenUsage {
                input: usage.prompt_tokens,
                output: usage.completion_tokens,
            });

        Ok(Completion {
            text,
            model: api_response.model.unwrap_or_else(|| self.model.clone()),
            tokens_used,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Builds [`ChatCompletionProvider`]s that share one connection pool.
pub struct HttpProviderFactory {
    /// Shared HTTP client.
    client: Client,
    /// Resolved process-wide settings.
    settings: Arc<AssistantSettings>,
}

impl HttpProviderFactory {
    /// Creates a factory whose HTTP client enforces the configured deadline.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: Arc<AssistantSettings>) -> Result<Self> {
        let client = Client::builder().timeout(settings.models.timeout).build()?;
        Ok(Self { client, settings })
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn build(&self, model: &str) -> Result<Arc<dyn ModelProvider>> {
        let provider = ChatCompletionProvider::new(self.client.clone(), &self.settings, model)?;
        Ok(Arc::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmaster_core::{AssistantConfig, build_breakdown_prompt};

    fn settings(kind: ProviderKind) -> AssistantSettings {
        let mut config = AssistantConfig::default();
        config.provider.kind = kind;
        config.provider.api_key = Some("test_key".to_owned());
        AssistantSettings::resolve_with(&config, |_| None).unwrap()
    }

    #[test]
    fn test_invalid_model_ids_are_rejected() {
        let settings = settings(ProviderKind::OpenRouter);
        for model in ["", "gpt 4o", "model\n"] {
            let result = ChatCompletionProvider::new(Client::new(), &settings, model);
            assert!(
                matches!(result, Err(Error::Config(_))),
                "model {model:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        let mut settings = settings(ProviderKind::Groq);
        settings.api_key = String::new();
        let result = ChatCompletionProvider::new(Client::new(), &settings, "llama-3.1-8b-instant");
        assert!(matches!(result, Err(Error::MissingApiKey(_))));
    }

    #[test]
    fn test_provider_name_follows_backend() {
        for (kind, name) in [
            (ProviderKind::OpenRouter, "openrouter"),
            (ProviderKind::OpenAi, "openai"),
            (ProviderKind::Groq, "groq"),
        ] {
            let provider =
                ChatCompletionProvider::new(Client::new(), &settings(kind), "some-model").unwrap();
            assert_eq!(provider.name(), name);
            assert_eq!(provider.model(), "some-model");
            assert_eq!(provider.endpoint, kind.default_endpoint());
        }
    }

    #[test]
    fn test_request_body_separates_instructions_from_task() {
        let provider =
            ChatCompletionProvider::new(Client::new(), &settings(ProviderKind::OpenAi), "gpt-4o")
                .unwrap();
        let prompt = build_breakdown_prompt("Plan my sister's wedding", None);

        let body = provider.build_request_body(&prompt, 512);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], prompt.system.as_str());
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], prompt.user.as_str());
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_factory_builds_provider_for_model() {
        let factory = HttpProviderFactory::new(Arc::new(settings(ProviderKind::OpenRouter))).unwrap();
        let provider = factory.build("openai/gpt-4o-mini").unwrap();
        assert_eq!(provider.model(), "openai/gpt-4o-mini");
        assert!(factory.build("   ").is_err());
    }
}
