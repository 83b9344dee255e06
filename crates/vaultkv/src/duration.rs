//! Go-style duration strings (`"3h25m19s"`, `"500ms"`, `"0s"`).
//!
//! The server reads and writes durations in the format of Go's
//! `time.ParseDuration`. Bare integers are accepted as seconds.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A duration string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration '{input}': {reason}")]
pub struct DurationError {
    input: String,
    reason: &'static str,
}

impl DurationError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_owned(),
            reason,
        }
    }
}

/// Parse a Go-style duration string.
///
/// # Errors
///
/// Returns [`DurationError`] for empty, negative, unit-less (other than a
/// bare integer), or unknown-unit input.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::new(input, "empty string"));
    }
    if s.starts_with('-') {
        return Err(DurationError::new(input, "negative durations are not allowed"));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut rest = s.strip_prefix('+').unwrap_or(s);
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(DurationError::new(input, "expected a number"));
        }
        let (number, tail) = rest.split_at(num_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3_600 * NANOS_PER_SEC,
            "" => return Err(DurationError::new(input, "missing unit")),
            _ => return Err(DurationError::new(input, "unknown unit")),
        };
        let term = scaled_nanos(number, scale).map_err(|reason| DurationError::new(input, reason))?;
        total = total
            .checked_add(term)
            .ok_or_else(|| DurationError::new(input, "duration out of range"))?;
        rest = next;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| DurationError::new(input, "duration out of range"))?;
    let subsec = u32::try_from(total % NANOS_PER_SEC)
        .map_err(|_| DurationError::new(input, "duration out of range"))?;
    Ok(Duration::new(secs, subsec))
}

/// `number` (digits with at most one `.`) times `scale` nanoseconds, using
/// integer arithmetic. Fractional digits past the nanosecond are truncated.
fn scaled_nanos(number: &str, scale: u128) -> Result<u128, &'static str> {
    const OUT_OF_RANGE: &str = "duration out of range";

    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if frac.contains('.') || (whole.is_empty() && frac.is_empty()) {
        return Err("malformed number");
    }

    let mut nanos: u128 = 0;
    for digit in whole.bytes() {
        nanos = nanos
            .checked_mul(10)
            .and_then(|n| n.checked_add(u128::from(digit - b'0')))
            .ok_or(OUT_OF_RANGE)?;
    }
    nanos = nanos.checked_mul(scale).ok_or(OUT_OF_RANGE)?;

    // Beyond 20 digits a fraction cannot change a whole nanosecond at any
    // supported scale.
    let mut frac_value: u128 = 0;
    let mut frac_scale: u128 = 1;
    for digit in frac.bytes().take(20) {
        frac_value = frac_value * 10 + u128::from(digit - b'0');
        frac_scale *= 10;
    }
    nanos
        .checked_add(frac_value * scale / frac_scale)
        .ok_or(OUT_OF_RANGE)
}

/// Format a duration the way the server prints one.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.subsec_nanos();
    if nanos != 0 {
        if nanos % 1_000_000 == 0 {
            return format!("{}ms", d.as_millis());
        }
        return format!("{}ns", d.as_nanos());
    }

    let total = d.as_secs();
    let hours = total / 3_600;
    let mins = (total % 3_600) / 60;
    let s = total % 60;
    if hours > 0 {
        format!("{hours}h{mins}m{s}s")
    } else if mins > 0 {
        format!("{mins}m{s}s")
    } else {
        format!("{s}s")
    }
}

/// `serde(with = ...)` adapter for [`Duration`] fields carried as Go-style
/// strings. Integer seconds are accepted on input.
pub(crate) mod go_string {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub(crate) fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}
