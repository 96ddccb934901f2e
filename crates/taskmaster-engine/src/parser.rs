//! Model output parsing.
//!
//! Replies are expected to be a single JSON object, but models routinely wrap
//! it in prose or code fences. The outermost object is cut out of the text,
//! checked to really be an object and then deserialized into loose shape
//! structs whose fields are all optional. Missing keys take the documented
//! defaults; keys with the wrong type fail with [`Error::Parse`].

use core::mem;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, from_str, from_value};

use taskmaster_core::{
    BreakdownResult, Error, Priority, PriorityResult, Result, SubtaskSuggestion,
};

/// Longest slice of model output quoted back in an error message.
const PREVIEW_CHARS: usize = 200;

/// Minutes in one working day, used for estimates given in days.
const MINUTES_PER_DAY: f64 = 8.0 * 60.0;

#[derive(Deserialize)]
struct RawBreakdown {
    #[serde(default)]
    subtasks: Option<Vec<RawSubtask>>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Deserialize)]
struct RawSubtask {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    estimated_time: Option<RawEstimate>,
}

/// Estimates arrive as integers, floats or free text like "1h 30m".
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEstimate {
    Whole(u32),
    Fractional(f64),
    Text(String),
}

#[derive(Deserialize)]
struct RawPriority {
    #[serde(default)]
    suggested_priority: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Cuts the span from the first `{` to the last `}` out of `text`.
///
/// # Errors
/// Returns `Error::Parse` when the text holds no such span.
pub fn extract_json_object(text: &str) -> Result<&str> {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(Error::Parse(format!(
            "No JSON object found in model output: {}",
            preview(text)
        ))),
    }
}

/// Parses a breakdown reply.
///
/// # Errors
/// Returns `Error::Parse` if the reply is not a JSON object of the expected
/// shape or an estimate carries no duration.
pub fn parse_breakdown(raw: &str) -> Result<BreakdownResult> {
    let parsed: RawBreakdown = parse_object(raw)?;

    let subtasks = parsed
        .subtasks
        .unwrap_or_default()
        .into_iter()
        .map(|subtask| {
            let estimated_minutes = match subtask.estimated_time {
                None => 0,
                Some(RawEstimate::Whole(minutes)) => minutes,
                Some(RawEstimate::Fractional(minutes)) => minutes_from_f64(minutes)?,
                Some(RawEstimate::Text(text)) => parse_estimate_minutes(&text)?,
            };
            Ok(SubtaskSuggestion {
                title: subtask.title.unwrap_or_default(),
                estimated_minutes,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(BreakdownResult {
        subtasks,
        reasoning: parsed.reasoning.unwrap_or_default(),
    })
}

/// Parses a priority reply.
///
/// # Errors
/// Returns `Error::Parse` if the reply is not a JSON object of the expected
/// shape or names an unknown priority.
pub fn parse_priority(raw: &str) -> Result<PriorityResult> {
    let parsed: RawPriority = parse_object(raw)?;

    let suggested_priority = match parsed.suggested_priority {
        Some(value) => value.parse::<Priority>()?,
        None => Priority::default(),
    };

    Ok(PriorityResult {
        suggested_priority,
        confidence: parsed.confidence.unwrap_or(0.0),
        reasoning: parsed.reasoning.unwrap_or_default(),
    })
}

/// Normalises a free-text duration to whole minutes.
///
/// A bare number is minutes. Numbers followed by an hour, minute or day unit
/// are scaled and summed, so `"1h 30m"` is 90. In a range such as
/// `"1-2 hours"` the upper bound wins. Only the first parenthesised or
/// unparenthesised segment that holds a number is read, so a restatement
/// like `"90 minutes (1.5 hours)"` is not counted twice.
///
/// # Errors
/// Returns `Error::Parse` when the text carries no number or uses a comma
/// between digits, which could be a decimal or a thousands separator.
pub fn parse_estimate_minutes(text: &str) -> Result<u32> {
    let lowered = text.to_ascii_lowercase();
    let segment = lowered
        .split(['(', ')'])
        .find(|part| part.chars().any(|character| character.is_ascii_digit()))
        .unwrap_or_default();

    if has_digit_comma(segment) {
        return Err(Error::Parse(format!(
            "Estimate {text:?} has an ambiguous comma between digits"
        )));
    }

    let mut total = 0.0_f64;
    let mut found = false;
    let mut pending: Option<f64> = None;

    for token in tokenize(segment) {
        match token {
            Token::Number(digits) => {
                let value = digits.parse::<f64>().map_err(|_| {
                    Error::Parse(format!("Invalid number {digits:?} in estimate {text:?}"))
                })?;
                pending = Some(value);
            }
            Token::Word(word) => {
                if let Some(factor) = unit_factor(&word)
                    && let Some(value) = pending.take()
                {
                    total += value * factor;
                    found = true;
                }
            }
        }
    }

    if let Some(value) = pending {
        total += value;
        found = true;
    }

    if !found {
        return Err(Error::Parse(format!(
            "Estimate {text:?} does not contain a duration"
        )));
    }
    minutes_from_f64(total)
}

fn has_digit_comma(text: &str) -> bool {
    text.as_bytes()
        .windows(3)
        .any(|window| window[0].is_ascii_digit() && window[1] == b',' && window[2].is_ascii_digit())
}

enum Token {
    Number(String),
    Word(String),
}

/// Splits text into runs of digits (with dots) and runs of letters.
///
/// A dot continues a number, or starts one when a digit follows and it does
/// not end a word, so `".5"` reads as a half but `"approx."` does not.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_number = false;
    let mut chars = text.chars().peekable();

    while let Some(character) = chars.next() {
        let in_word = !current.is_empty() && !in_number;
        let is_number = character.is_ascii_digit()
            || (character == '.'
                && ((in_number && !current.is_empty())
                    || (!in_word && chars.peek().is_some_and(char::is_ascii_digit))));
        let is_word = character.is_alphabetic();
        if !current.is_empty() && (!(is_number || is_word) || is_number != in_number) {
            tokens.push(finish_token(&mut current, in_number));
        }
        if is_number || is_word {
            current.push(character);
            in_number = is_number;
        }
    }
    if !current.is_empty() {
        tokens.push(finish_token(&mut current, in_number));
    }
    tokens
}

fn finish_token(current: &mut String, in_number: bool) -> Token {
    let text = mem::take(current);
    if in_number {
        Token::Number(text)
    } else {
        Token::Word(text)
    }
}

fn unit_factor(word: &str) -> Option<f64> {
    match word {
        "m" | "min" | "mins" | "minute" | "minutes" => Some(1.0),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(60.0),
        "d" | "day" | "days" => Some(MINUTES_PER_DAY),
        _ => None,
    }
}

fn minutes_from_f64(minutes: f64) -> Result<u32> {
    if !minutes.is_finite() || minutes < 0.0 || minutes > f64::from(u32::MAX) {
        return Err(Error::Parse(format!("Estimate {minutes} is out of range")));
    }
    Ok(minutes.round() as u32)
}

/// Locates the reply's JSON object and deserializes it into `T`.
fn parse_object<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let value = match from_str::<Value>(raw.trim()) {
        Ok(value) => value,
        Err(_) => from_str::<Value>(extract_json_object(raw)?).map_err(|err| {
            Error::Parse(format!(
                "Model output is not valid JSON: {err}\nResponse: {}",
                preview(raw)
            ))
        })?,
    };

    if !value.is_object() {
        return Err(Error::Parse(format!(
            "Expected a JSON object, got: {}",
            preview(raw)
        )));
    }

    from_value(value).map_err(|err| {
        Error::Parse(format!(
            "Model output has an unexpected shape: {err}\nResponse: {}",
            preview(raw)
        ))
    })
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_owned();
    }
    let mut cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}
