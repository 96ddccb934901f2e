use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension as _, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use taskmaster_core::{Endpoint, Inference, InferencePayload, InferenceStatus};

use crate::store::{format_timestamp, parse_json, parse_timestamp, parse_uuid};
use crate::{InferenceStore, Result, StoreError};

/// Key of the error marker inside a degraded entry's output.
const ERROR_KEY: &str = "error";

/// Audit record of one assistant invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceLogEntry {
    /// Record identifier.
    pub id: Uuid,
    /// User who triggered the invocation.
    pub user_id: String,
    /// Task the invocation was about, if any.
    pub task_id: Option<Uuid>,
    /// Registered model version that served it, if any.
    pub model_version_id: Option<Uuid>,
    /// Model identifier that served it, if a client was built.
    pub model_name: Option<String>,
    /// Operation invoked.
    pub endpoint: Endpoint,
    /// Rendered prompt.
    pub input_text: String,
    /// Result returned to the user, plus an `error` marker when degraded.
    pub output: Value,
    /// Elapsed time of the completion call.
    pub latency_ms: u64,
    /// Reported confidence, for operations that have one.
    pub confidence: Option<f64>,
    /// Whether the user accepted the suggestion.
    pub user_accepted: Option<bool>,
    /// Free-text feedback from the user.
    pub user_feedback: Option<String>,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

impl InferenceLogEntry {
    /// Recovers the user-facing result from `output`.
    ///
    /// # Errors
    /// Returns an error if the output does not hold a `T`.
    pub fn result<T: InferencePayload>(&self) -> Result<T> {
        let mut output = self.output.clone();
        if let Some(object) = output.as_object_mut() {
            object.remove(ERROR_KEY);
        }
        Ok(serde_json::from_value(output)?)
    }

    /// Error marker of a degraded invocation, if any.
    pub fn error(&self) -> Option<&Value> {
        self.output.get(ERROR_KEY)
    }
}

/// Fields supplied when recording an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInferenceLog {
    /// Owning user; must not be blank.
    pub user_id: String,
    /// Related task, if any.
    pub task_id: Option<Uuid>,
    /// Registered model version, if any.
    pub model_version_id: Option<Uuid>,
    /// Model identifier.
    pub model_name: Option<String>,
    /// Operation invoked.
    pub endpoint: Endpoint,
    /// Rendered prompt.
    pub input_text: String,
    /// Result plus optional error marker.
    pub output: Value,
    /// Elapsed time of the completion call.
    pub latency_ms: u64,
    /// Confidence in `[0, 1]`, if any.
    pub confidence: Option<f64>,
}

impl NewInferenceLog {
    /// Builds the log record for an orchestrator result.
    ///
    /// `input_text` is the prompt the engine actually sent.
    ///
    /// # Errors
    /// Returns an error if the result cannot be serialized.
    pub fn from_inference<T: InferencePayload>(
        user_id: impl Into<String>,
        task_id: Option<Uuid>,
        inference: &Inference<T>,
    ) -> Result<Self> {
        let mut output = serde_json::to_value(&inference.result)?;
        if let InferenceStatus::Degraded { kind, message } = &inference.status
            && let Some(object) = output.as_object_mut()
        {
            object.insert(
                ERROR_KEY.to_owned(),
                json!({"kind": kind, "message": message}),
            );
        }

        Ok(Self {
            user_id: user_id.into(),
            task_id,
            model_version_id: None,
            model_name: inference.model.clone(),
            endpoint: T::ENDPOINT,
            input_text: inference.prompt.to_log_text(),
            output,
            latency_ms: inference.latency_ms,
            confidence: inference.result.confidence(),
        })
    }

    /// Links the record to a registered model version.
    #[must_use]
    pub fn with_model_version(mut self, model_version_id: Option<Uuid>) -> Self {
        self.model_version_id = model_version_id;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(StoreError::Invalid("user_id must not be blank".to_owned()));
        }
        if let Some(confidence) = self.confidence
            && !(0.0..=1.0).contains(&confidence)
        {
            return Err(StoreError::Invalid(format!(
                "confidence {confidence} is outside [0, 1]"
            )));
        }
        Ok(())
    }
}

const SELECT_COLUMNS: &str = r"
    SELECT id, user_id, task_id, model_version_id, model_name, endpoint, input_text,
           output, latency_ms, confidence, user_accepted, user_feedback, created_at
    FROM inference_logs";

fn map_log_row(row: &Row<'_>) -> rusqlite::Result<InferenceLogEntry> {
    let id: String = row.get(0)?;
    let task_id: Option<String> = row.get(2)?;
    let model_version_id: Option<String> = row.get(3)?;
    let endpoint: String = row.get(5)?;
    let output: String = row.get(7)?;
    let latency_ms: i64 = row.get(8)?;
    let created_at: String = row.get(12)?;

    Ok(InferenceLogEntry {
        id: parse_uuid(0, &id)?,
        user_id: row.get(1)?,
        task_id: task_id.as_deref().map(|text| parse_uuid(2, text)).transpose()?,
        model_version_id: model_version_id
            .as_deref()
            .map(|text| parse_uuid(3, text))
            .transpose()?,
        model_name: row.get(4)?,
        endpoint: endpoint.parse::<Endpoint>().map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(err))
        })?,
        input_text: row.get(6)?,
        output: parse_json(7, &output)?,
        latency_ms: u64::try_from(latency_ms).unwrap_or_default(),
        confidence: row.get(9)?,
        user_accepted: row.get(10)?,
        user_feedback: row.get(11)?,
        created_at: parse_timestamp(12, &created_at)?,
    })
}

impl InferenceStore {
    /// Inserts one log entry.
    ///
    /// # Errors
    /// Returns `StoreError::Invalid` for a blank user or out-of-range
    /// confidence, or a database error.
    pub fn record_inference(&self, new: &NewInferenceLog) -> Result<InferenceLogEntry> {
        new.validate()?;

        let entry = InferenceLogEntry {
            id: Uuid::new_v4(),
            user_id: new.user_id.trim().to_owned(),
            task_id: new.task_id,
            model_version_id: new.model_version_id,
            model_name: new.model_name.clone(),
            endpoint: new.endpoint,
            input_text: new.input_text.clone(),
            output: new.output.clone(),
            latency_ms: new.latency_ms,
            confidence: new.confidence,
            user_accepted: None,
            user_feedback: None,
            created_at: Utc::now(),
        };

        self.connection()
            .execute(
                r"
                INSERT INTO inference_logs (
                    id, user_id, task_id, model_version_id, model_name, endpoint,
                    input_text, output, latency_ms, confidence, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ",
                params![
                    entry.id.to_string(),
                    entry.user_id,
                    entry.task_id.map(|id| id.to_string()),
                    entry.model_version_id.map(|id| id.to_string()),
                    entry.model_name,
                    entry.endpoint.as_str(),
                    entry.input_text,
                    serde_json::to_string(&entry.output)?,
                    i64::try_from(entry.latency_ms).unwrap_or(i64::MAX),
                    entry.confidence,
                    format_timestamp(entry.created_at),
                ],
            )
            .map_err(|err| StoreError::from_write(err, "model version does not exist"))?;

        Ok(entry)
    }

    /// Looks up an entry by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_inference(&self, id: Uuid) -> Result<Option<InferenceLogEntry>> {
        let entry = self
            .connection()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
                map_log_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Lists a user's entries, newest first.
    ///
    /// The user id is trimmed the same way it was when recorded.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_inferences(&self, user_id: &str, limit: usize) -> Result<Vec<InferenceLogEntry>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map(params![user_id.trim(), limit], map_log_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Stores the user's verdict on one of their own entries.
    ///
    /// Only the feedback fields change. Entries owned by someone else are
    /// reported as missing.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if `user_id` owns no entry `id`.
    pub fn record_feedback(
        &self,
        user_id: &str,
        id: Uuid,
        accepted: bool,
        feedback: Option<&str>,
    ) -> Result<InferenceLogEntry> {
        let updated = self.connection().execute(
            r"
            UPDATE inference_logs
            SET user_accepted = ?1, user_feedback = ?2
            WHERE id = ?3 AND user_id = ?4
            ",
            params![accepted, feedback, id.to_string(), user_id.trim()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("Inference log {id}")));
        }

        self.get_inference(id)?
            .ok_or_else(|| StoreError::NotFound(format!("Inference log {id}")))
    }

    /// Clears the task link of every entry that referenced `task_id`.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub fn detach_task(&self, task_id: Uuid) -> Result<usize> {
        let detached = self.connection().execute(
            "UPDATE inference_logs SET task_id = NULL WHERE task_id = ?1",
            params![task_id.to_string()],
        )?;
        Ok(detached)
    }
}
