//! SQLite persistence for inference logs and model versions.
//!
//! The store is a single connection behind a mutex. Callers on an async
//! runtime run its methods on the blocking pool.
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

/// Store error type.
pub mod error;
/// Audit records of assistant invocations.
pub mod inference_log;
/// Versioned model configurations.
pub mod model_version;
/// Table definitions and schema versioning.
mod schema;
/// Connection management.
pub mod store;

pub use error::{Result, StoreError};
pub use inference_log::{InferenceLogEntry, NewInferenceLog};
pub use model_version::{ModelVersion, NewModelVersion};
pub use store::InferenceStore;
