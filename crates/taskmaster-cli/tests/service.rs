//! Service-level behaviour: validation, degraded results and inference logging.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        reason = "Test allows"
    )
)]

use core::time::Duration;
use std::sync::Arc;

use chrono::NaiveDate;
use taskmaster_cli::{AssistantService, ServiceError};
use taskmaster_core::{
    BreakdownRequest, BreakdownResult, Endpoint, Error, FixedClock, ModelSettings, Priority,
    PriorityResult, SuggestPriorityRequest,
};
use taskmaster_engine::InferenceEngine;
use taskmaster_providers::{MockProvider, MockProviderFactory};
use taskmaster_store::{InferenceStore, NewModelVersion, StoreError};
use uuid::Uuid;

const BREAKDOWN_RESPONSE: &str = r#"{
  "subtasks": [
    {"title": "Collect income statements", "estimated_time": 45},
    {"title": "Gather deduction receipts", "estimated_time": "1 hour"},
    {"title": "Fill in and submit the return", "estimated_time": 90}
  ],
  "reasoning": "Documents first, then the return."
}"#;

const PRIORITY_RESPONSE: &str =
    r#"{"suggested_priority": "high", "confidence": 0.85, "reasoning": "Due today."}"#;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 15).unwrap()
}

struct Harness {
    service: AssistantService,
    provider: MockProvider,
    store: Arc<InferenceStore>,
}

fn harness(provider: MockProvider) -> Harness {
    let settings = Arc::new(ModelSettings {
        primary: "openai/gpt-4o".to_owned(),
        fallback: "openai/gpt-4o-mini".to_owned(),
        max_tokens: 1024,
        temperature: 0.2,
        timeout: Duration::from_secs(5),
    });
    let factory = MockProviderFactory::new(provider.clone());
    let engine = InferenceEngine::new(settings, Arc::new(factory))
        .with_clock(Arc::new(FixedClock(today())));
    let store = Arc::new(InferenceStore::open_in_memory().unwrap());

    Harness {
        service: AssistantService::new(engine, Arc::clone(&store)),
        provider,
        store,
    }
}

fn validation_fields(error: ServiceError) -> Vec<String> {
    match error {
        ServiceError::Core(Error::Validation(validation)) => {
            validation.errors.into_keys().collect()
        }
        other => panic!("expected a validation error, got {other}"),
    }
}

/// Tests short titles are rejected before any model call or log write.
#[tokio::test]
async fn test_short_title_is_rejected_without_model_call() {
    let harness = harness(MockProvider::new().with_default_response(BREAKDOWN_RESPONSE));

    let error = harness
        .service
        .breakdown_task("alice", None, BreakdownRequest::new("  Tax "))
        .await
        .err()
        .unwrap();

    assert_eq!(validation_fields(error), ["title"]);
    assert_eq!(harness.provider.call_count(), 0);
    assert!(harness.store.list_inferences("alice", 10).unwrap().is_empty());
}

/// Tests due dates before today are rejected while today is accepted.
#[tokio::test]
async fn test_due_date_boundary() {
    let harness = harness(MockProvider::new().with_default_response(PRIORITY_RESPONSE));
    let yesterday = today().pred_opt().unwrap();

    let error = harness
        .service
        .suggest_priority(
            "alice",
            None,
            SuggestPriorityRequest::new("File taxes").with_due_date(yesterday),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(validation_fields(error), ["due_date"]);
    assert_eq!(harness.provider.call_count(), 0);

    let served = harness
        .service
        .suggest_priority(
            "alice",
            None,
            SuggestPriorityRequest::new("File taxes").with_due_date(today()),
        )
        .await
        .unwrap();
    assert_eq!(served.result.suggested_priority, Priority::High);
    assert_eq!(harness.provider.call_count(), 1);
}

/// Tests a successful breakdown writes exactly one matching log entry.
#[tokio::test]
async fn test_breakdown_is_logged() {
    let harness = harness(MockProvider::new().with_default_response(BREAKDOWN_RESPONSE));
    let task_id = Uuid::new_v4();

    let served = harness
        .service
        .breakdown_task(
            "alice",
            Some(task_id),
            BreakdownRequest::new("  File taxes  ").with_description("Federal and state"),
        )
        .await
        .unwrap();
    let result = served.result.clone();
    let entry = served.log.settled().await.unwrap();

    assert_eq!(result.subtasks.len(), 3);
    assert_eq!(result.subtasks[1].estimated_minutes, 60);

    assert_eq!(entry.user_id, "alice");
    assert_eq!(entry.task_id, Some(task_id));
    assert_eq!(entry.endpoint, Endpoint::BreakdownTask);
    assert_eq!(entry.model_name.as_deref(), Some("openai/gpt-4o"));
    assert_eq!(entry.confidence, None);
    assert!(entry.error().is_none());
    assert!(entry.input_text.contains("\"title\": \"File taxes\""));
    assert!(entry.input_text.contains("Federal and state"));
    let sent = harness.provider.get_call_history();
    assert_eq!(sent.len(), 1);
    assert!(entry.input_text.ends_with(&sent[0]), "logged prompt differs from the sent one");
    assert_eq!(entry.result::<BreakdownResult>().unwrap(), result);
    assert_eq!(harness.store.list_inferences("alice", 10).unwrap().len(), 1);
}

/// Tests a provider failure is served degraded and logged with its marker.
#[tokio::test]
async fn test_provider_failure_is_served_degraded_and_logged() {
    let harness = harness(MockProvider::new().with_failure("503 service unavailable"));

    let served = harness
        .service
        .suggest_priority("alice", None, SuggestPriorityRequest::new("File taxes"))
        .await
        .unwrap();
    let result = served.result.clone();
    let entry = served.log.settled().await.unwrap();

    assert_eq!(result.suggested_priority, Priority::Medium);
    assert!(result.confidence.abs() < f64::EPSILON);
    assert!(result.reasoning.contains("503 service unavailable"));

    let marker = entry.error().unwrap();
    assert_eq!(marker["kind"], "provider");
    assert_eq!(entry.confidence, Some(0.0));
    assert_eq!(entry.result::<PriorityResult>().unwrap(), result);
}

/// Tests entries link to the active version of the serving model.
#[tokio::test]
async fn test_log_links_active_model_version() {
    let harness = harness(MockProvider::new().with_default_response(PRIORITY_RESPONSE));
    let version = harness
        .store
        .register_model_version(&NewModelVersion::new("openai/gpt-4o", "2025-04"))
        .unwrap();
    harness.store.activate_model_version(version.id).unwrap();

    let served = harness
        .service
        .suggest_priority("alice", None, SuggestPriorityRequest::new("File taxes"))
        .await
        .unwrap();
    let entry = served.log.settled().await.unwrap();

    assert_eq!(entry.model_version_id, Some(version.id));
    assert_eq!(entry.confidence, Some(0.85));
}

/// Tests feedback through the service is limited to the owner.
#[tokio::test]
async fn test_feedback_round_trip() {
    let harness = harness(MockProvider::new().with_default_response(PRIORITY_RESPONSE));
    let served = harness
        .service
        .suggest_priority("alice", None, SuggestPriorityRequest::new("File taxes"))
        .await
        .unwrap();
    let entry = served.log.settled().await.unwrap();

    let error = harness
        .service
        .record_feedback("bob", entry.id, true, None)
        .await
        .err()
        .unwrap();
    assert!(matches!(error, ServiceError::Store(StoreError::NotFound(_))));

    let updated = harness
        .service
        .record_feedback("alice", entry.id, false, Some("Not that urgent".to_owned()))
        .await
        .unwrap();
    assert_eq!(updated.user_accepted, Some(false));
    assert_eq!(updated.user_feedback.as_deref(), Some("Not that urgent"));

    let recent = harness.service.recent_inferences("alice", 5).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].user_accepted, Some(false));
}

/// Tests concurrent requests each get their own log entry.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_each_logged() {
    let harness = Arc::new(harness(
        MockProvider::new()
            .with_default_response(PRIORITY_RESPONSE)
            .with_delay(Duration::from_millis(20)),
    ));

    let tasks: Vec<_> = (0..6)
        .map(|index| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move {
                let request = SuggestPriorityRequest::new(format!("Renew permit #{index}"));
                let served = harness
                    .service
                    .suggest_priority("alice", None, request)
                    .await
                    .unwrap();
                served.log.settled().await.unwrap()
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(harness.store.list_inferences("alice", 50).unwrap().len(), 6);
    assert_eq!(harness.provider.call_count(), 6);
}
