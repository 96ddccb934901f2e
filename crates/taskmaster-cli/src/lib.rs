//! Library interface for taskmaster-cli
//!
//! Exposes the service layer so integration tests can drive it with a mock
//! provider and an in-memory store.
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

/// Validation, inference and logging behind one async API.
pub mod service;

pub use service::{AssistantService, LogBook, PendingLog, Served, ServiceError};
