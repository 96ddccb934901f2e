//! Command handlers for CLI operations

use std::env;
use std::io::{self, Write as _};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow, bail};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use taskmaster_cli::{AssistantService, LogBook, ServiceError};
use taskmaster_core::{
    AssistantConfig, AssistantSettings, BreakdownRequest, Error, SuggestPriorityRequest,
};
use taskmaster_store::{InferenceStore, NewModelVersion};

use crate::cli::{Cli, Commands, ConfigCommands, ModelCommands};

/// Exit status for rejected input.
const EXIT_VALIDATION: u8 = 2;

/// Initialize tracing to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "taskmaster_cli=info,taskmaster_engine=info,taskmaster_providers=warn,taskmaster_store=warn"
                .into()
        }))
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .init();
}

/// Dispatches a parsed command line.
///
/// # Errors
/// Returns an error for configuration problems and store failures.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => AssistantConfig::config_path()?,
    };

    if let Commands::Config {
        action: ConfigCommands::Init { force },
    } = &cli.command
    {
        return handle_config_init(&config_path, *force);
    }

    let config = AssistantConfig::load_or_create(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let database_path = match &cli.database {
        Some(path) => path.clone(),
        None => config.database_path()?,
    };

    match cli.command {
        Commands::Breakdown {
            title,
            description,
            task_id,
        } => {
            let service = build_service(&config, &database_path)?;
            let user = resolve_user(cli.user)?;
            let request = BreakdownRequest::new(title).with_description(description);
            match service.breakdown_task(&user, task_id, request).await {
                Ok(served) => {
                    write_json(&served.result)?;
                    if let Some(entry) = served.log.settled().await {
                        info!(log_id = %entry.id, "Inference logged");
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(error) => rejected(error),
            }
        }
        Commands::Priority {
            title,
            description,
            due_date,
            task_id,
        } => {
            let service = build_service(&config, &database_path)?;
            let user = resolve_user(cli.user)?;
            let mut request = SuggestPriorityRequest::new(title).with_description(description);
            request.due_date = due_date;
            match service.suggest_priority(&user, task_id, request).await {
                Ok(served) => {
                    write_json(&served.result)?;
                    if let Some(entry) = served.log.settled().await {
                        info!(log_id = %entry.id, "Inference logged");
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(error) => rejected(error),
            }
        }
        Commands::Feedback {
            id,
            accept,
            comment,
            ..
        } => {
            let user = resolve_user(cli.user)?;
            let entry = open_log_book(&database_path)?
                .record_feedback(&user, id, accept, comment)
                .await?;
            write_json(&entry)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Logs { limit } => {
            let user = resolve_user(cli.user)?;
            let entries = open_log_book(&database_path)?
                .recent_inferences(&user, limit)
                .await?;
            write_json(&entries)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Models { action } => {
            handle_models(open_log_book(&database_path)?, action).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}

async fn handle_models(log_book: LogBook, action: ModelCommands) -> Result<()> {
    match action {
        ModelCommands::Register {
            name,
            version,
            model_config,
            metrics,
        } => {
            let mut new = NewModelVersion::new(name, version);
            if let Some(text) = model_config {
                new.config = parse_json_arg("--model-config", &text)?;
            }
            if let Some(text) = metrics {
                new.metrics = parse_json_arg("--metrics", &text)?;
            }
            write_json(&log_book.register_model_version(new).await?)
        }
        ModelCommands::Activate { id } => write_json(&log_book.activate_model_version(id).await?),
        ModelCommands::List { name } => write_json(&log_book.list_model_versions(name).await?),
    }
}

fn handle_config_init(path: &Path, force: bool) -> Result<ExitCode> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    AssistantConfig::default().save_to_file(path)?;
    write_json(&json!({"config": path}))?;
    Ok(ExitCode::SUCCESS)
}

/// Resolves settings and opens the store for the inference commands.
fn build_service(config: &AssistantConfig, database_path: &Path) -> Result<AssistantService> {
    let settings = Arc::new(AssistantSettings::resolve(config)?);
    info!(
        provider = ?settings.provider,
        primary = %settings.models.primary,
        fallback = %settings.models.fallback,
        "Resolved assistant settings"
    );
    let store = Arc::new(open_store(database_path)?);
    Ok(AssistantService::from_settings(settings, store)?)
}

fn open_log_book(database_path: &Path) -> Result<LogBook> {
    Ok(LogBook::new(Arc::new(open_store(database_path)?)))
}

fn open_store(database_path: &Path) -> Result<InferenceStore> {
    InferenceStore::open(database_path)
        .with_context(|| format!("Failed to open {}", database_path.display()))
}

/// Falls back to the OS login name when no user was given.
fn resolve_user(user: Option<String>) -> Result<String> {
    user.or_else(|| env::var("USER").ok())
        .or_else(|| env::var("USERNAME").ok())
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("No user given; pass --user or set TASKMASTER_USER"))
}

/// Prints field errors with the validation exit status, or propagates.
fn rejected(error: ServiceError) -> Result<ExitCode> {
    match error {
        ServiceError::Core(Error::Validation(validation)) => {
            write_json(&json!({"errors": validation.errors}))?;
            Ok(ExitCode::from(EXIT_VALIDATION))
        }
        other => Err(other.into()),
    }
}

fn parse_json_arg(flag: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("{flag} is not valid JSON"))
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_user_wins() {
        assert_eq!(resolve_user(Some(" alice ".to_owned())).unwrap(), "alice");
    }

    #[test]
    fn test_validation_error_maps_to_exit_two() {
        let error = ServiceError::Core(Error::Validation(
            taskmaster_core::ValidationError::field("title", "too short"),
        ));
        assert!(rejected(error).is_ok());
    }

    #[test]
    fn test_other_errors_propagate() {
        let error = ServiceError::Core(Error::Provider("down".to_owned()));
        assert!(rejected(error).is_err());
    }

    #[test]
    fn test_json_arguments_are_checked() {
        assert_eq!(
            parse_json_arg("--metrics", r#"{"accuracy": 0.9}"#).unwrap(),
            json!({"accuracy": 0.9})
        );
        assert!(parse_json_arg("--metrics", "{oops").is_err());
    }
}
