use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::store::{format_timestamp, parse_json, parse_timestamp, parse_uuid};
use crate::{InferenceStore, Result, StoreError};

/// A tracked configuration of a model, independent of code releases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Record identifier.
    pub id: Uuid,
    /// Model identifier, e.g. `openai/gpt-4o`.
    pub model_name: String,
    /// Free-form version label.
    pub version: String,
    /// Model configuration snapshot.
    pub config: Value,
    /// Evaluation metrics.
    pub metrics: Value,
    /// Whether this is the active version of `model_name`.
    pub is_active: bool,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering a model version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewModelVersion {
    /// Model identifier.
    pub model_name: String,
    /// Version label, unique per model.
    pub version: String,
    /// Configuration snapshot, `{}` if omitted.
    #[serde(default = "empty_object")]
    pub config: Value,
    /// Metrics, `{}` if omitted.
    #[serde(default = "empty_object")]
    pub metrics: Value,
}

impl NewModelVersion {
    /// Creates a registration with empty config and metrics.
    pub fn new(model_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            version: version.into(),
            config: empty_object(),
            metrics: empty_object(),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

const SELECT_COLUMNS: &str =
    "SELECT id, model_name, version, config, metrics, is_active, created_at FROM model_versions";

fn map_model_version_row(row: &Row<'_>) -> rusqlite::Result<ModelVersion> {
    let id: String = row.get(0)?;
    let config: String = row.get(3)?;
    let metrics: String = row.get(4)?;
    let created_at: String = row.get(6)?;

    Ok(ModelVersion {
        id: parse_uuid(0, &id)?,
        model_name: row.get(1)?,
        version: row.get(2)?,
        config: parse_json(3, &config)?,
        metrics: parse_json(4, &metrics)?,
        is_active: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}

impl InferenceStore {
    /// Registers an inactive model version.
    ///
    /// # Errors
    /// Returns `StoreError::Invalid` for a blank name or version and
    /// `StoreError::Conflict` if the version is already registered.
    pub fn register_model_version(&self, new: &NewModelVersion) -> Result<ModelVersion> {
        let model_name = new.model_name.trim();
        let version = new.version.trim();
        if model_name.is_empty() || version.is_empty() {
            return Err(StoreError::Invalid(
                "model_name and version must not be blank".to_owned(),
            ));
        }

        let record = ModelVersion {
            id: Uuid::new_v4(),
            model_name: model_name.to_owned(),
            version: version.to_owned(),
            config: new.config.clone(),
            metrics: new.metrics.clone(),
            is_active: false,
            created_at: Utc::now(),
        };

        self.connection()
            .execute(
                r"
                INSERT INTO model_versions (id, model_name, version, config, metrics, is_active, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
                ",
                params![
                    record.id.to_string(),
                    record.model_name,
                    record.version,
                    serde_json::to_string(&record.config)?,
                    serde_json::to_string(&record.metrics)?,
                    format_timestamp(record.created_at),
                ],
            )
            .map_err(|err| {
                StoreError::from_write(
                    err,
                    &format!("{model_name} version {version} is already registered"),
                )
            })?;

        Ok(record)
    }

    /// Makes `id` the single active version of its model.
    ///
    /// Deactivating the current version and activating the new one happen in
    /// one transaction.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if no version has this id.
    pub fn activate_model_version(&self, id: Uuid) -> Result<ModelVersion> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        let model_name: String = tx
            .query_row(
                "SELECT model_name FROM model_versions WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("Model version {id}")))?;

        tx.execute(
            "UPDATE model_versions SET is_active = 0 WHERE model_name = ?1 AND is_active = 1",
            params![model_name],
        )?;
        tx.execute(
            "UPDATE model_versions SET is_active = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;

        let activated = tx.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id.to_string()],
            map_model_version_row,
        )?;
        tx.commit()?;

        info!(model = %activated.model_name, version = %activated.version, "Activated model version");
        Ok(activated)
    }

    /// Active version of `model_name`, if one is set.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn active_model_version(&self, model_name: &str) -> Result<Option<ModelVersion>> {
        let version = self
            .connection()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE model_name = ?1 AND is_active = 1"),
                params![model_name],
                map_model_version_row,
            )
            .optional()?;
        Ok(version)
    }

    /// Looks up a version by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn get_model_version(&self, id: Uuid) -> Result<Option<ModelVersion>> {
        let version = self
            .connection()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
                map_model_version_row,
            )
            .optional()?;
        Ok(version)
    }

    /// Lists versions, newest first, optionally for one model.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_model_versions(&self, model_name: Option<&str>) -> Result<Vec<ModelVersion>> {
        let conn = self.connection();
        let versions = if let Some(name) = model_name {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE model_name = ?1 ORDER BY created_at DESC, rowid DESC"
            ))?;
            stmt.query_map(params![name], map_model_version_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC"))?;
            stmt.query_map([], map_model_version_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(versions)
    }

    /// Deletes a version. Log entries that referenced it keep their
    /// `model_name` and lose the version link.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn delete_model_version(&self, id: Uuid) -> Result<bool> {
        let deleted = self.connection().execute(
            "DELETE FROM model_versions WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }
}
