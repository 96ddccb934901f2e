use core::fmt;
use core::result::Result as CoreResult;
use std::collections::BTreeMap;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur across the assistant pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required API key was not found.
    #[error("API key not found: {0}")]
    MissingApiKey(String),

    /// A model provider encountered an error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The completion call exceeded its deadline.
    #[error("Provider timed out after {0}ms")]
    Timeout(u64),

    /// Model output was not the expected structured data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Caller input was rejected before reaching the model.
    #[error("Validation failed: {0}")]
    Validation(ValidationError),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], recorded as the error marker of a
/// degraded inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller input violated a stated constraint.
    Validation,
    /// Network, authentication, deadline or provider-side failure.
    Provider,
    /// Model output could not be parsed into the expected shape.
    Parse,
    /// Missing or invalid configuration.
    Configuration,
    /// Anything else.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::Provider => "provider",
            Self::Parse => "parse",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        };
        formatter.write_str(label)
    }
}

impl Error {
    /// Classifies this error into the assistant's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Request(_) | Self::Provider(_) | Self::Timeout(_) => ErrorKind::Provider,
            Self::Json(_) | Self::Parse(_) => ErrorKind::Parse,
            Self::Toml(_) | Self::Config(_) | Self::MissingApiKey(_) => ErrorKind::Configuration,
            Self::Io(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}

impl From<ValidationError> for Error {
    fn from(error: ValidationError) -> Self {
        Self::Validation(error)
    }
}

/// Field-tagged rejection of caller input.
///
/// Maps each offending field to one or more human readable messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Messages keyed by field name.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Creates a rejection for a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut error = Self::default();
        error.add(field, message);
        error
    }

    /// Records another message for `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Returns true when no field was rejected.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the messages recorded for `field`.
    pub fn messages(&self, field: &str) -> &[String] {
        self.errors.get(field).map_or(&[], Vec::as_slice)
    }

    /// Converts into `Err` when at least one field was rejected.
    ///
    /// # Errors
    /// Returns `Error::Validation` carrying `self` when it is not empty.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    formatter.write_str("; ")?;
                }
                write!(formatter, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}
