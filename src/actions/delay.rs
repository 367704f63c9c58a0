//! Parsing of `send` delays.

use serde_json::Value;
use std::time::Duration;

/// Parse a CSS2-style duration: a number with an optional `ms`, `s` or `m`
/// suffix. A bare number is milliseconds.
///
/// ```rust
/// use stateflow::actions::parse_delay;
/// use std::time::Duration;
///
/// assert_eq!(parse_delay("250"), Some(Duration::from_millis(250)));
/// assert_eq!(parse_delay("1.5s"), Some(Duration::from_millis(1500)));
/// assert_eq!(parse_delay("2m"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_delay("soon"), None);
/// ```
pub fn parse_delay(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return Some(Duration::ZERO);
    }
    let (number, factor) = if let Some(n) = text.strip_suffix("ms") {
        (n, 1.0)
    } else if let Some(n) = text.strip_suffix('s') {
        (n, 1_000.0)
    } else if let Some(n) = text.strip_suffix('m') {
        (n, 60_000.0)
    } else {
        (text, 1.0)
    };
    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(Duration::from_millis((value * factor).round() as u64))
}

/// Delay from an evaluated `delayexpr`: numbers are milliseconds.
pub fn delay_from_value(value: &Value) -> Option<Duration> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| Duration::from_millis(v.round() as u64)),
        Value::String(s) => parse_delay(s),
        Value::Null => Some(Duration::ZERO),
        _ => None,
    }
}
