use core::time::Duration;
use std::sync::Arc;

use tokio::time::timeout;
use tracing::warn;

use taskmaster_core::{
    Completion, Error, ModelProvider, ModelSettings, Prompt, ProviderFactory, Result,
};

/// A provider bound to the model chosen at construction time.
///
/// Construction tries the primary model and falls back to the fallback model
/// once if the primary cannot be built. Requests are never retried: a call
/// that fails after construction surfaces its error to the caller.
pub struct ModelClient {
    provider: Arc<dyn ModelProvider>,
    max_tokens: u32,
    deadline: Duration,
    used_fallback: bool,
}

impl ModelClient {
    /// Builds a client for the primary model, or the fallback model if the
    /// primary cannot be constructed.
    ///
    /// # Errors
    /// Returns the fallback's construction error when both models fail.
    pub fn connect(factory: &dyn ProviderFactory, settings: &ModelSettings) -> Result<Self> {
        let (provider, used_fallback) = match factory.build(&settings.primary) {
            Ok(provider) => (provider, false),
            Err(primary_error) => {
                warn!(
                    primary = %settings.primary,
                    fallback = %settings.fallback,
                    error = %primary_error,
                    "Primary model unavailable, constructing fallback"
                );
                (factory.build(&settings.fallback)?, true)
            }
        };

        Ok(Self {
            provider,
            max_tokens: settings.max_tokens,
            deadline: settings.timeout,
            used_fallback,
        })
    }

    /// Model identifier requests are sent to.
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Whether the fallback model was constructed.
    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    /// Sends one completion request bounded by the configured deadline.
    ///
    /// # Errors
    /// Returns the provider's error, or `Error::Timeout` when the deadline
    /// expires first.
    pub async fn complete(&self, prompt: &Prompt) -> Result<Completion> {
        match timeout(self.deadline, self.provider.complete(prompt, self.max_tokens)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(Error::Timeout(self.deadline.as_millis() as u64)),
        }
    }
}
