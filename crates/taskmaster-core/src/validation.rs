//! Request validation performed at the caller boundary.
//!
//! Validation runs before the orchestrator is invoked, so a rejected request
//! never costs a model call.

use chrono::NaiveDate;

use crate::{BreakdownRequest, Result, SuggestPriorityRequest, ValidationError};

/// Minimum title length, in characters, after trimming.
pub const MIN_TITLE_CHARS: usize = 5;
/// Maximum title length, in characters, after trimming.
pub const MAX_TITLE_CHARS: usize = 255;

/// Validates and normalizes a breakdown request.
///
/// # Errors
/// Returns `Error::Validation` tagged with `title` when the trimmed title is
/// empty, shorter than [`MIN_TITLE_CHARS`] or longer than [`MAX_TITLE_CHARS`].
pub fn validate_breakdown(request: BreakdownRequest) -> Result<BreakdownRequest> {
    let mut errors = ValidationError::default();
    let title = check_title(&request.title, &mut errors);
    errors.into_result()?;

    Ok(BreakdownRequest {
        title,
        description: request.description.trim().to_owned(),
    })
}

/// Validates and normalizes a priority request against `today`.
///
/// # Errors
/// Returns `Error::Validation` tagged with `title` for a bad title and with
/// `due_date` when the due date is strictly before `today`.
pub fn validate_priority(
    request: SuggestPriorityRequest,
    today: NaiveDate,
) -> Result<SuggestPriorityRequest> {
    let mut errors = ValidationError::default();
    let title = check_title(&request.title, &mut errors);

    if let Some(due_date) = request.due_date
        && due_date < today
    {
        errors.add("due_date", "Due date cannot be in the past.");
    }
    errors.into_result()?;

    Ok(SuggestPriorityRequest {
        title,
        description: request.description.trim().to_owned(),
        due_date: request.due_date,
    })
}

/// Trims `title` and records any length violation.
fn check_title(title: &str, errors: &mut ValidationError) -> String {
    let trimmed = title.trim();
    let length = trimmed.chars().count();

    if length == 0 {
        errors.add("title", "This field may not be blank.");
    } else if length < MIN_TITLE_CHARS {
        errors.add(
            "title",
            format!("Ensure this field has at least {MIN_TITLE_CHARS} characters."),
        );
    } else if length > MAX_TITLE_CHARS {
        errors.add(
            "title",
            format!("Ensure this field has no more than {MAX_TITLE_CHARS} characters."),
        );
    }

    trimmed.to_owned()
}
