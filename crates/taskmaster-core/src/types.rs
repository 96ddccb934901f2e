use core::fmt;
use core::str::FromStr;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Error, ErrorKind, Prompt, Result};

/// Reasoning recorded when the model returned a breakdown without explaining it.
pub const DEFAULT_BREAKDOWN_REASONING: &str =
    "The model returned subtasks without explaining its reasoning.";
/// Reasoning recorded when the model returned a priority without explaining it.
pub const DEFAULT_PRIORITY_REASONING: &str =
    "The model returned a priority without explaining its reasoning.";

/// Assistant operation an inference was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Task decomposition into subtasks.
    BreakdownTask,
    /// Priority suggestion.
    SuggestPriority,
}

impl Endpoint {
    /// Stable identifier used in logs and storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BreakdownTask => "breakdown_task",
            Self::SuggestPriority => "suggest_priority",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "breakdown_task" => Ok(Self::BreakdownTask),
            "suggest_priority" => Ok(Self::SuggestPriority),
            other => Err(Error::Other(format!("Unknown endpoint: {other}"))),
        }
    }
}

/// Input of the breakdown-task operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownRequest {
    /// Task title, 5..=255 characters once trimmed.
    pub title: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: String,
}

impl BreakdownRequest {
    /// Creates a request with an empty description.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Input of the suggest-priority operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestPriorityRequest {
    /// Task title, 5..=255 characters once trimmed.
    pub title: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: String,
    /// Optional due date; must not be in the past.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl SuggestPriorityRequest {
    /// Creates a request with no description or due date.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_date: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the due date.
    #[must_use]
    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// One suggested subtask of a breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskSuggestion {
    /// Short actionable title.
    pub title: String,
    /// Estimated effort in minutes.
    #[serde(rename = "estimated_time")]
    pub estimated_minutes: u32,
}

/// Result of the breakdown-task operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownResult {
    /// Subtasks in the order the model proposed them.
    pub subtasks: Vec<SubtaskSuggestion>,
    /// Explanation of the decomposition.
    pub reasoning: String,
}

/// Priority level of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Conservative default.
    #[default]
    Medium,
    /// Needs attention soon.
    High,
}

impl Priority {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::Parse(format!("Unknown priority: {other}"))),
        }
    }
}

/// Result of the suggest-priority operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityResult {
    /// Suggested priority level.
    pub suggested_priority: Priority,
    /// Model confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Explanation of the suggestion.
    pub reasoning: String,
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input: u64,
    /// Completion tokens.
    pub output: u64,
}

impl TokenUsage {
    /// Sum of prompt and completion tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Raw text returned by a provider for one completion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    pub text: String,
    /// Model identifier that produced the text.
    pub model: String,
    /// Token usage of the call.
    pub tokens_used: TokenUsage,
    /// Wall time of the provider call.
    pub latency_ms: u64,
}

/// Whether an inference succeeded or fell back to its degraded result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InferenceStatus {
    /// The model produced a result that parsed cleanly.
    Ok,
    /// A failure was absorbed; the result is the fixed degraded default.
    Degraded {
        /// Error class of the absorbed failure.
        kind: ErrorKind,
        /// Error text of the absorbed failure.
        message: String,
    },
}

/// Orchestrator output: the typed result plus the bookkeeping the caller logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference<T> {
    /// Result returned to the end user.
    pub result: T,
    /// Internal success or error marker.
    pub status: InferenceStatus,
    /// Prompt exactly as it was sent to the model.
    pub prompt: Prompt,
    /// Model that served the request, if a client could be built.
    pub model: Option<String>,
    /// Whether the fallback model had to be used.
    pub used_fallback: bool,
    /// Elapsed time from the start of the completion call.
    pub latency_ms: u64,
    /// Token usage of the completion call.
    pub tokens_used: TokenUsage,
}

impl<T> Inference<T> {
    /// Returns true when a failure was absorbed.
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, InferenceStatus::Degraded { .. })
    }

    /// Error class of the absorbed failure, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            InferenceStatus::Ok => None,
            InferenceStatus::Degraded { kind, .. } => Some(*kind),
        }
    }

    /// Drops the bookkeeping and keeps the user-facing result.
    pub fn into_result(self) -> T {
        self.result
    }
}

/// Behaviour shared by the two structured results.
pub trait InferencePayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Operation this payload answers.
    const ENDPOINT: Endpoint;

    /// Fixed conservative result used when the pipeline fails.
    fn degraded(reasoning: String) -> Self;

    /// Confidence to record in the inference log.
    fn confidence(&self) -> Option<f64>;

    /// Fills fields the model left blank once parsing succeeded.
    #[must_use]
    fn finalize(self) -> Self;
}

impl InferencePayload for BreakdownResult {
    const ENDPOINT: Endpoint = Endpoint::BreakdownTask;

    fn degraded(reasoning: String) -> Self {
        Self {
            subtasks: Vec::new(),
            reasoning,
        }
    }

    fn confidence(&self) -> Option<f64> {
        None
    }

    fn finalize(mut self) -> Self {
        self.subtasks.retain(|subtask| !subtask.title.trim().is_empty());
        for subtask in &mut self.subtasks {
            subtask.title = subtask.title.trim().to_owned();
        }
        if self.reasoning.trim().is_empty() {
            DEFAULT_BREAKDOWN_REASONING.clone_into(&mut self.reasoning);
        }
        self
    }
}

impl InferencePayload for PriorityResult {
    const ENDPOINT: Endpoint = Endpoint::SuggestPriority;

    fn degraded(reasoning: String) -> Self {
        Self {
            suggested_priority: Priority::Medium,
            confidence: 0.0,
            reasoning,
        }
    }

    fn confidence(&self) -> Option<f64> {
        Some(self.confidence)
    }

    fn finalize(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        if self.reasoning.trim().is_empty() {
            DEFAULT_PRIORITY_REASONING.clone_into(&mut self.reasoning);
        }
        self
    }
}
