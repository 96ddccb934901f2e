//! Prompt templates and rendering
//!
//! Each prompt file is a markdown document with Usage and Prompt sections,
//! embedded at compile time using `include_str!`. The Prompt section becomes
//! the system message; task fields are rendered into a separate user message
//! as an escaped JSON object so they are never read as instructions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

// Embed prompt files at compile time
const TASK_BREAKDOWN_MD: &str = include_str!("../../../../prompts/task_breakdown.md");
const PRIORITY_SUGGESTION_MD: &str = include_str!("../../../../prompts/priority_suggestion.md");

/// Rendered completion request: fixed instructions plus task data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Fixed instruction template.
    pub system: String,
    /// Task fields, serialized as data.
    pub user: String,
}

impl Prompt {
    /// Flattens the prompt for the inference log's `input_text`.
    pub fn to_log_text(&self) -> String {
        format!("[system]\n{}\n\n[user]\n{}", self.system, self.user)
    }
}

/// Renders the breakdown prompt for a task.
pub fn build_breakdown_prompt(title: &str, description: Option<&str>) -> Prompt {
    let task = json!({
        "title": title,
        "description": description.unwrap_or_default(),
    });

    Prompt {
        system: instructions(TASK_BREAKDOWN_MD),
        user: format!("Break down this task:\n{task:#}"),
    }
}

/// Renders the priority prompt for a task.
///
/// A missing `due_date` is rendered as `today`.
pub fn build_priority_prompt(
    title: &str,
    description: Option<&str>,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Prompt {
    let due = due_date.unwrap_or(today);
    let task = json!({
        "title": title,
        "description": description.unwrap_or_default(),
        "due_date": due.format("%Y-%m-%d").to_string(),
    });

    Prompt {
        system: instructions(PRIORITY_SUGGESTION_MD),
        user: format!("Suggest a priority for this task:\n{task:#}"),
    }
}

/// Returns the Prompt section of an embedded markdown file, or the whole file
/// if it has no such section.
fn instructions(markdown: &'static str) -> String {
    extract_prompt_section(markdown).unwrap_or_else(|| markdown.trim().to_owned())
}

/// Extracts the Prompt section from a markdown file
fn extract_prompt_section(content: &str) -> Option<String> {
    let prompt_start = content.find("## Prompt")?;

    // Skip past the header line
    let body_start = content[prompt_start..].find('\n')? + prompt_start + 1;

    // ## Prompt is the last top-level section of every prompt file
    Some(content[body_start..].trim().to_owned())
}
