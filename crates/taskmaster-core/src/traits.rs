use std::sync::Arc;

use async_trait::async_trait;

use crate::{Completion, Prompt, Result};

/// Trait for text-completion providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the unique identifier for this provider backend.
    fn name(&self) -> &'static str;

    /// Returns the model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Sends one completion request.
    ///
    /// # Errors
    ///
    /// Returns a provider error if the request fails, the provider rejects it,
    /// or the response carries no text.
    async fn complete(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion>;
}

/// Builds a provider bound to a specific model identifier.
pub trait ProviderFactory: Send + Sync {
    /// Constructs a provider for `model`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider cannot be constructed
    /// for this model.
    fn build(&self, model: &str) -> Result<Arc<dyn ModelProvider>>;
}
