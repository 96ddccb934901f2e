//! Configuration for the provider, model selection and storage.
//!
//! [`AssistantConfig`] is the on-disk TOML form. [`AssistantSettings`] is the
//! validated, read-once form built at startup and shared by reference; it is
//! never mutated afterwards.

use core::fmt;
use core::time::Duration;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable that overrides the provider-specific API key variable.
pub const ENV_TASKMASTER_API_KEY: &str = "TASKMASTER_API_KEY";

/// Remote completion backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `OpenRouter` multi-provider gateway.
    #[default]
    OpenRouter,
    /// `OpenAI` API.
    OpenAi,
    /// Groq API.
    Groq,
}

impl ProviderKind {
    /// Chat-completions endpoint used when no `endpoint` is configured.
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::Groq => "https://api.groq.com/openai/v1/chat/completions",
        }
    }

    /// Environment variable holding this backend's API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
        }
    }
}

/// Complete assistant configuration as stored in `config.toml`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Provider backend and credentials
    pub provider: ProviderConfig,
    /// Model selection and request limits
    pub models: ModelConfig,
    /// Inference log storage
    pub storage: StorageConfig,
}

/// Provider backend configuration.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend to talk to
    pub kind: ProviderKind,
    /// Override of the chat-completions endpoint
    pub endpoint: Option<String>,
    /// API key; falls back to environment variables when absent
    pub api_key: Option<String>,
}

/// Model selection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model tried first
    pub primary: String,
    /// Model used when the primary cannot be constructed
    pub fallback: String,
    /// Maximum completion tokens per request
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Deadline for a single completion call
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary: "openai/gpt-4o".to_owned(),
            fallback: "openai/gpt-4o-mini".to_owned(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout_seconds: 30,
        }
    }
}

/// Inference log storage configuration.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; defaults to `~/.taskmaster/inference.db`
    pub database_path: Option<PathBuf>,
}

impl AssistantConfig {
    /// Get the default config directory path (`~/.taskmaster`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".taskmaster"))
    }

    /// Get the default config file path (`~/.taskmaster/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from `path`, creating it with default values if missing.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read, parsed or created
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let config = Self::default();
            config.save_to_file(path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)?;

        tracing::debug!(
            "Loaded config from {:?}: provider={:?}, api_key={}",
            path,
            config.provider.kind,
            if config.provider.api_key.is_some() {
                "present"
            } else {
                "missing"
            }
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# TaskMaster Assistant Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Resolve the inference log database path.
    ///
    /// # Errors
    /// Returns an error if no path is configured and the home directory cannot be determined
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("inference.db")),
        }
    }
}

/// Validated model selection shared with the model client.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// Model tried first
    pub primary: String,
    /// Model used when the primary cannot be constructed
    pub fallback: String,
    /// Maximum completion tokens per request
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Deadline for a single completion call
    pub timeout: Duration,
}

impl ModelSettings {
    /// Validates the model section of a config.
    ///
    /// # Errors
    /// Returns a configuration error for empty model names, a zero token
    /// budget or a zero timeout.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        if config.primary.trim().is_empty() {
            return Err(Error::Config("models.primary must not be empty".to_owned()));
        }
        if config.fallback.trim().is_empty() {
            return Err(Error::Config("models.fallback must not be empty".to_owned()));
        }
        if config.max_tokens == 0 {
            return Err(Error::Config("models.max_tokens must be positive".to_owned()));
        }
        if config.timeout_seconds == 0 {
            return Err(Error::Config(
                "models.timeout_seconds must be positive".to_owned(),
            ));
        }

        Ok(Self {
            primary: config.primary.trim().to_owned(),
            fallback: config.fallback.trim().to_owned(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }
}

/// Process-wide settings resolved once at startup.
#[derive(Clone)]
pub struct AssistantSettings {
    /// Provider backend
    pub provider: ProviderKind,
    /// Chat-completions endpoint
    pub endpoint: String,
    /// Provider credential
    pub api_key: String,
    /// Model selection
    pub models: ModelSettings,
}

impl AssistantSettings {
    /// Resolves settings from config and the process environment.
    ///
    /// # Errors
    /// Returns `Error::MissingApiKey` when no credential is configured, or a
    /// configuration error for invalid model settings.
    pub fn resolve(config: &AssistantConfig) -> Result<Self> {
        Self::resolve_with(config, |key| env::var(key).ok())
    }

    /// Resolves settings using `lookup` in place of the process environment.
    ///
    /// The key is taken from the config file first, then
    /// `TASKMASTER_API_KEY`, then the backend's own variable.
    ///
    /// # Errors
    /// Same as [`AssistantSettings::resolve`].
    pub fn resolve_with(
        config: &AssistantConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let kind = config.provider.kind;
        let present = |key: &String| !key.trim().is_empty();
        let api_key = config
            .provider
            .api_key
            .clone()
            .filter(present)
            .or_else(|| lookup(ENV_TASKMASTER_API_KEY).filter(present))
            .or_else(|| lookup(kind.api_key_env()).filter(present))
            .ok_or_else(|| {
                Error::MissingApiKey(format!(
                    "{ENV_TASKMASTER_API_KEY}, {} or config.toml provider.api_key",
                    kind.api_key_env()
                ))
            })?;

        let endpoint = config
            .provider
            .endpoint
            .clone()
            .unwrap_or_else(|| kind.default_endpoint().to_owned());

        Ok(Self {
            provider: kind,
            endpoint,
            api_key,
            models: ModelSettings::from_config(&config.models)?,
        })
    }
}

impl fmt::Debug for AssistantSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AssistantSettings")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("models", &self.models)
            .finish()
    }
}
