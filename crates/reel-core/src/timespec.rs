//! Clock-style time offsets (`"90"`, `"1:30"`, `"1:02:03"`) used for cut
//! ranges and live capture durations.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A time value as clients send it: either plain seconds or a clock string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum TimeValue {
    Seconds(f64),
    Clock(String),
}

impl TimeValue {
    /// Normalised text form, as persisted in the task record.
    pub fn into_text(self) -> String {
        match self {
            TimeValue::Seconds(s) => format_seconds(s),
            TimeValue::Clock(c) => c,
        }
    }
}

/// Parse a time value into seconds.
///
/// Colon-separated components are read right to left as seconds, minutes,
/// hours. Anything else (empty, more than three parts, non-numeric or
/// negative parts) yields `None`, meaning "no bound".
pub fn parse_time(input: &str) -> Option<f64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let mut total = 0.0;
    for (unit, part) in parts.iter().rev().enumerate() {
        let value: f64 = part.trim().parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        total += value * 60f64.powi(unit as i32);
    }
    Some(total)
}

/// Render seconds without a trailing `.0` for whole values.
pub fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 && seconds.abs() < 1e15 {
        format!("{}", seconds as i64)
    } else {
        format!("{seconds}")
    }
}
