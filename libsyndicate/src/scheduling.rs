//! Schedule-string parsing for operator tooling
//!
//! Turns human-entered time expressions into a concrete due time:
//! relative durations ("2h", "30m") and natural language
//! ("tomorrow 3pm", "next friday").

use chrono::{DateTime, Duration, Utc};

use crate::{Result, SyndicateError};

/// Parse a schedule string into a DateTime
///
/// # Errors
///
/// Returns `InvalidInput` when the expression cannot be parsed.
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    if input.is_empty() {
        return Err(SyndicateError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(SyndicateError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

fn parse_duration(input: &str) -> Result<Duration> {
    if let Ok(std_duration) = humantime::parse_duration(input) {
        let seconds = std_duration.as_secs() as i64;
        return Duration::try_seconds(seconds)
            .ok_or_else(|| SyndicateError::InvalidInput("Duration out of range".to_string()));
    }

    Err(SyndicateError::InvalidInput(format!(
        "Could not parse duration: {}",
        input
    )))
}

fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| SyndicateError::InvalidInput(format!("Could not parse time: {}", e)))
}
