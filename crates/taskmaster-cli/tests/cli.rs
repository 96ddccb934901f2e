//! Drives the `taskmaster` binary end to end without a reachable provider.
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

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Isolated config, database and environment for one test.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn database_path(&self) -> PathBuf {
        self.dir.path().join("inference.db")
    }

    /// Writes a config whose endpoint refuses connections immediately.
    fn with_unreachable_provider(self) -> Self {
        fs::write(
            self.config_path(),
            r#"
[provider]
kind = "openai"
endpoint = "http://127.0.0.1:9/v1/chat/completions"
api_key = "test-key"

[models]
timeout_seconds = 5
"#,
        )
        .expect("Failed to write config");
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::cargo_bin("taskmaster").expect("binary should build");
        command
            .arg("--config")
            .arg(self.config_path())
            .arg("--database")
            .arg(self.database_path())
            .arg("--user")
            .arg("alice")
            .env("HOME", self.dir.path())
            .env_remove("TASKMASTER_API_KEY")
            .env_remove("OPENROUTER_API_KEY")
            .env_remove("OPENAI_API_KEY")
            .env_remove("GROQ_API_KEY")
            .env_remove("RUST_LOG");
        command
    }
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should be JSON")
}

/// Tests a short title exits with status 2 and field errors on stdout.
#[test]
fn test_short_title_exits_with_validation_status() {
    let workspace = Workspace::new().with_unreachable_provider();

    let output = workspace
        .command()
        .args(["breakdown", "--title", "Tax"])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();

    let body = stdout_json(&output);
    assert!(body["errors"]["title"].is_array(), "unexpected body: {body}");
}

/// Tests a past due date exits with status 2 and a due_date error.
#[test]
fn test_past_due_date_exits_with_validation_status() {
    let workspace = Workspace::new().with_unreachable_provider();

    workspace
        .command()
        .args(["priority", "--title", "File taxes", "--due-date", "2000-01-01"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("due_date"))
        .stdout(predicate::str::contains("Due date cannot be in the past."));
}

/// Tests a missing API key is a configuration error before any command runs.
#[test]
fn test_missing_api_key_fails_fast() {
    let workspace = Workspace::new();

    workspace
        .command()
        .args(["breakdown", "--title", "Plan my sister's wedding"])
        .assert()
        .failure()
        .code(predicate::ne(2))
        .stderr(predicate::str::contains("API key not found"));

    assert!(workspace.config_path().exists());
}

/// Tests an unreachable provider still yields a well-formed degraded result
/// and a logged entry carrying the error marker.
#[test]
fn test_unreachable_provider_degrades_and_logs() {
    let workspace = Workspace::new().with_unreachable_provider();

    let output = workspace
        .command()
        .args(["priority", "--title", "File taxes"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let result = stdout_json(&output);
    assert_eq!(result["suggested_priority"], "medium");
    assert_eq!(result["confidence"], 0.0);
    assert!(result["reasoning"].as_str().unwrap().contains("Unable to suggest a priority"));
    assert!(result.get("error").is_none(), "error marker must not reach the user");

    let logs = workspace
        .command()
        .args(["logs", "--limit", "5"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let logs = stdout_json(&logs);
    let entries = logs.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["endpoint"], "suggest_priority");
    assert_eq!(entries[0]["output"]["error"]["kind"], "provider");

    let id = entries[0]["id"].as_str().unwrap().to_owned();
    workspace
        .command()
        .args(["feedback", "--id", &id, "--reject", "--comment", "Wrong"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"user_accepted\": false"));
}

/// Tests feedback on an entry the user doesn't own fails.
#[test]
fn test_feedback_for_unknown_entry_fails() {
    let workspace = Workspace::new().with_unreachable_provider();

    workspace
        .command()
        .args([
            "feedback",
            "--id",
            "6f1c1f5e-3c1b-4d7a-9b9e-0d6b1a2c3d4e",
            "--accept",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

/// Tests accept and reject can't be combined.
#[test]
fn test_feedback_flags_conflict() {
    let workspace = Workspace::new().with_unreachable_provider();

    workspace
        .command()
        .args([
            "feedback",
            "--id",
            "6f1c1f5e-3c1b-4d7a-9b9e-0d6b1a2c3d4e",
            "--accept",
            "--reject",
        ])
        .assert()
        .failure();
}

/// Tests registering and activating model versions through the binary.
#[test]
fn test_model_version_lifecycle() {
    let workspace = Workspace::new().with_unreachable_provider();

    let mut ids = Vec::new();
    for version in ["v1", "v2"] {
        let output = workspace
            .command()
            .args([
                "models",
                "register",
                "--name",
                "openai/gpt-4o",
                "--version",
                version,
                "--metrics",
                r#"{"acceptance_rate": 0.7}"#,
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let registered = stdout_json(&output);
        assert_eq!(registered["is_active"], false);
        assert_eq!(registered["metrics"]["acceptance_rate"], 0.7);
        ids.push(registered["id"].as_str().unwrap().to_owned());
    }

    for id in [&ids[0], &ids[1]] {
        workspace
            .command()
            .args(["models", "activate", "--id", id])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"is_active\": true"));
    }

    let output = workspace
        .command()
        .args(["models", "list", "--name", "openai/gpt-4o"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let listed = stdout_json(&output);
    let active: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .filter(|version| version["is_active"] == true)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], ids[1].as_str());
}

/// Tests invalid JSON metadata is refused.
#[test]
fn test_model_register_rejects_invalid_json() {
    let workspace = Workspace::new().with_unreachable_provider();

    workspace
        .command()
        .args([
            "models",
            "register",
            "--name",
            "openai/gpt-4o",
            "--version",
            "v1",
            "--model-config",
            "{not json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--model-config is not valid JSON"));
}

/// Tests config init writes a loadable file and refuses to overwrite it.
#[test]
fn test_config_init() {
    let workspace = Workspace::new();

    workspace
        .command()
        .args(["config", "init"])
        .assert()
        .success();
    let written = fs::read_to_string(workspace.config_path()).unwrap();
    assert!(written.contains("[models]"));
    assert!(written.contains("openai/gpt-4o"));

    workspace
        .command()
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    workspace
        .command()
        .args(["config", "init", "--force"])
        .assert()
        .success();
}
