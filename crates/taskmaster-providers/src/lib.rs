//! Provider adapters for external completion services.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

/// OpenAI-compatible chat-completions provider.
pub mod chat;
/// Model client with primary/fallback construction and a call deadline.
pub mod client;
/// Scriptable provider for tests and offline runs.
pub mod mock;

pub use chat::{ChatCompletionProvider, HttpProviderFactory};
pub use client::ModelClient;
pub use mock::{MockProvider, MockProviderFactory};
