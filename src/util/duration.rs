use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:([0-9]+)y)?(?:([0-9]+)w)?(?:([0-9]+)d)?(?:([0-9]+)h)?(?:([0-9]+)m)?(?:([0-9]+)s)?(?:([0-9]+)ms)?$",
    )
    .expect("duration pattern compiles")
});

const UNITS: [(&str, u64); 7] = [
    ("y", 365 * 24 * 60 * 60 * 1000),
    ("w", 7 * 24 * 60 * 60 * 1000),
    ("d", 24 * 60 * 60 * 1000),
    ("h", 60 * 60 * 1000),
    ("m", 60 * 1000),
    ("s", 1000),
    ("ms", 1),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration string")]
    Empty,
    #[error("not a valid duration string: {0:?}")]
    Invalid(String),
    #[error("duration out of range: {0:?}")]
    Overflow(String),
}

/// Parses a duration such as `5m`, `1h30m` or `0`.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    match input {
        "" => return Err(DurationError::Empty),
        "0" => return Ok(Duration::ZERO),
        _ => {}
    }

    let captures = DURATION_RE
        .captures(input)
        .ok_or_else(|| DurationError::Invalid(input.to_string()))?;

    let mut total_ms: u64 = 0;
    let mut matched_any = false;
    for (index, (_, unit_ms)) in UNITS.iter().enumerate() {
        let Some(group) = captures.get(index + 1) else {
            continue;
        };
        matched_any = true;
        let amount: u64 = group
            .as_str()
            .parse()
            .map_err(|_| DurationError::Overflow(input.to_string()))?;
        total_ms = amount
            .checked_mul(*unit_ms)
            .and_then(|part| total_ms.checked_add(part))
            .ok_or_else(|| DurationError::Overflow(input.to_string()))?;
    }

    if !matched_any {
        return Err(DurationError::Invalid(input.to_string()));
    }
    Ok(Duration::from_millis(total_ms))
}

/// Formats a duration with the largest units first, `0s` for zero.
pub fn format_duration(duration: Duration) -> String {
    let mut remaining = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if remaining == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, unit_ms) in UNITS {
        let amount = remaining / unit_ms;
        if amount > 0 {
            let _ = write!(out, "{amount}{unit}");
            remaining -= amount * unit_ms;
        }
    }
    out
}
