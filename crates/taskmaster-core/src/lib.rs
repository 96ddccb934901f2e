//! Core types and traits for the TaskMaster AI assistant.
//!
//! This crate provides the request and result types, the error taxonomy,
//! configuration, prompt rendering and request validation shared by the
//! provider, engine, store and CLI crates.
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

/// Calendar source for validation and prompt defaults.
pub mod clock;
/// Assistant configuration and resolved settings.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Prompt templates and rendering.
pub mod prompts;
/// Poison-tolerant locking helpers.
pub mod sync;
/// Trait definitions for model providers.
pub mod traits;
/// Request, result and completion types.
pub mod types;
/// Input validation performed before any model call.
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AssistantConfig, AssistantSettings, ModelSettings, ProviderKind};
pub use error::{Error, ErrorKind, Result, ValidationError};
pub use prompts::{Prompt, build_breakdown_prompt, build_priority_prompt};
pub use sync::IgnoreLock;
pub use traits::{ModelProvider, ProviderFactory};
pub use types::{
    BreakdownRequest, BreakdownResult, Completion, Endpoint, Inference, InferencePayload,
    InferenceStatus, Priority, PriorityResult, SubtaskSuggestion, SuggestPriorityRequest,
    TokenUsage,
};
pub use validation::{validate_breakdown, validate_priority};
