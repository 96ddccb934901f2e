//! Caller boundary of the assistant.
//!
//! Validates requests, runs the inference engine and records one inference
//! log entry per call. Logging happens on the blocking pool and never
//! changes what the caller gets back.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::{JoinError, JoinHandle, spawn_blocking};
use tracing::{debug, warn};
use uuid::Uuid;

use taskmaster_core::{
    AssistantSettings, BreakdownRequest, BreakdownResult, Inference, InferencePayload,
    PriorityResult, SuggestPriorityRequest, validate_breakdown, validate_priority,
};
use taskmaster_engine::InferenceEngine;
use taskmaster_providers::HttpProviderFactory;
use taskmaster_store::{
    InferenceLogEntry, InferenceStore, ModelVersion, NewInferenceLog, NewModelVersion, StoreError,
};

/// Errors surfaced by [`AssistantService`] and [`LogBook`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Rejected input or invalid configuration.
    #[error(transparent)]
    Core(#[from] taskmaster_core::Error),

    /// The inference store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blocking store task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Join(#[from] JoinError),
}

/// Result type for service operations.
pub type Result<T> = core::result::Result<T, ServiceError>;

/// A result together with the handle of its pending log write.
pub struct Served<T> {
    /// Result returned to the user.
    pub result: T,
    /// Log write started for this call.
    pub log: PendingLog,
}

/// Handle of a log write running in the background.
///
/// Dropping it lets the write finish on its own.
pub struct PendingLog(JoinHandle<Option<InferenceLogEntry>>);

impl PendingLog {
    /// Waits for the write and returns the stored entry, or `None` if the
    /// write failed.
    pub async fn settled(self) -> Option<InferenceLogEntry> {
        match self.0.await {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%error, "Inference log task did not complete");
                None
            }
        }
    }
}

/// Async front for the inference store.
#[derive(Clone)]
pub struct LogBook {
    store: Arc<InferenceStore>,
}

impl LogBook {
    /// Wraps a shared store.
    pub fn new(store: Arc<InferenceStore>) -> Self {
        Self { store }
    }

    /// Starts writing the log entry for one inference.
    pub fn persist<T: InferencePayload>(
        &self,
        user: &str,
        task_id: Option<Uuid>,
        inference: &Inference<T>,
    ) -> PendingLog {
        let new = NewInferenceLog::from_inference(user, task_id, inference);
        let store = Arc::clone(&self.store);

        PendingLog(spawn_blocking(move || {
            match new.and_then(|record| write_log(&store, record)) {
                Ok(entry) => {
                    debug!(log_id = %entry.id, endpoint = %entry.endpoint, "Recorded inference");
                    Some(entry)
                }
                Err(error) => {
                    warn!(%error, "Failed to record inference log");
                    None
                }
            }
        }))
    }

    /// Stores the user's verdict on one of their own log entries.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the user owns no such entry.
    pub async fn record_feedback(
        &self,
        user: &str,
        log_id: Uuid,
        accepted: bool,
        feedback: Option<String>,
    ) -> Result<InferenceLogEntry> {
        let user = user.to_owned();
        self.blocking(move |store| {
            store.record_feedback(&user, log_id, accepted, feedback.as_deref())
        })
        .await
    }

    /// Lists the user's most recent entries, newest first.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn recent_inferences(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<InferenceLogEntry>> {
        let user = user.to_owned();
        self.blocking(move |store| store.list_inferences(&user, limit))
            .await
    }

    /// Registers an inactive model version.
    ///
    /// # Errors
    /// Returns an error for blank fields or a duplicate version.
    pub async fn register_model_version(&self, new: NewModelVersion) -> Result<ModelVersion> {
        self.blocking(move |store| store.register_model_version(&new))
            .await
    }

    /// Makes a version the single active version of its model.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` for an unknown id.
    pub async fn activate_model_version(&self, id: Uuid) -> Result<ModelVersion> {
        self.blocking(move |store| store.activate_model_version(id))
            .await
    }

    /// Lists registered versions, optionally for one model.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn list_model_versions(&self, model_name: Option<String>) -> Result<Vec<ModelVersion>> {
        self.blocking(move |store| store.list_model_versions(model_name.as_deref()))
            .await
    }

    async fn blocking<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&InferenceStore) -> taskmaster_store::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        Ok(spawn_blocking(move || operation(&store)).await??)
    }
}

/// Links the entry to the active version of its model, then inserts it.
fn write_log(
    store: &InferenceStore,
    new: NewInferenceLog,
) -> taskmaster_store::Result<InferenceLogEntry> {
    let model_version_id = match &new.model_name {
        Some(model_name) => store
            .active_model_version(model_name)?
            .map(|version| version.id),
        None => None,
    };
    store.record_inference(&new.with_model_version(model_version_id))
}

/// The assistant's two operations plus feedback, behind input validation.
pub struct AssistantService {
    engine: InferenceEngine,
    log_book: LogBook,
}

impl AssistantService {
    /// Creates a service from an engine and a store.
    pub fn new(engine: InferenceEngine, store: Arc<InferenceStore>) -> Self {
        Self {
            engine,
            log_book: LogBook::new(store),
        }
    }

    /// Creates a service that talks to the configured HTTP provider.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_settings(
        settings: Arc<AssistantSettings>,
        store: Arc<InferenceStore>,
    ) -> Result<Self> {
        let models = Arc::new(settings.models.clone());
        let factory = HttpProviderFactory::new(settings)?;
        Ok(Self::new(InferenceEngine::new(models, Arc::new(factory)), store))
    }

    /// Underlying engine.
    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    /// Log store front.
    pub fn log_book(&self) -> &LogBook {
        &self.log_book
    }

    /// Breaks a task down into subtasks.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the request is rejected. Inference
    /// failures are not errors; they produce a degraded result.
    pub async fn breakdown_task(
        &self,
        user: &str,
        task_id: Option<Uuid>,
        request: BreakdownRequest,
    ) -> Result<Served<BreakdownResult>> {
        let request = validate_breakdown(request)?;
        let description = non_empty(&request.description);

        let inference = self
            .engine
            .analyze_task_for_breakdown(&request.title, description)
            .await;
        let log = self.log_book.persist(user, task_id, &inference);

        Ok(Served {
            result: inference.into_result(),
            log,
        })
    }

    /// Suggests a priority for a task.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the title is invalid or the due date
    /// is in the past.
    pub async fn suggest_priority(
        &self,
        user: &str,
        task_id: Option<Uuid>,
        request: SuggestPriorityRequest,
    ) -> Result<Served<PriorityResult>> {
        let request = validate_priority(request, self.engine.today())?;
        let description = non_empty(&request.description);

        let inference = self
            .engine
            .suggest_priority(&request.title, description, request.due_date)
            .await;
        let log = self.log_book.persist(user, task_id, &inference);

        Ok(Served {
            result: inference.into_result(),
            log,
        })
    }

    /// Stores the user's verdict on one of their own log entries.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the user owns no such entry.
    pub async fn record_feedback(
        &self,
        user: &str,
        log_id: Uuid,
        accepted: bool,
        feedback: Option<String>,
    ) -> Result<InferenceLogEntry> {
        self.log_book
            .record_feedback(user, log_id, accepted, feedback)
            .await
    }

    /// Lists the user's most recent log entries, newest first.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn recent_inferences(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<InferenceLogEntry>> {
        self.log_book.recent_inferences(user, limit).await
    }
}

fn non_empty(text: &str) -> Option<&str> {
    (!text.is_empty()).then_some(text)
}
