//! Human-readable duration strings used in engine settings.

use std::time::Duration;

/// Parse a duration string like `"500ms"`, `"3s"`, `"1m"` or `"2h"`.
///
/// A bare number is read as seconds. Returns `None` for anything else,
/// including negative values.
///
/// ```
/// use riptide::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("3s"), Some(Duration::from_secs(3)));
/// assert_eq!(parse_duration_string("250ms"), Some(Duration::from_millis(250)));
/// assert_eq!(parse_duration_string("30"), Some(Duration::from_secs(30)));
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();

    // "ms" must be checked before "m" and "s".
    if let Some(n) = s.strip_suffix("ms") {
        return n.parse::<u64>().ok().map(Duration::from_millis);
    }

    let (digits, multiplier) = if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else {
        (s, 1)
    };

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .map(Duration::from_secs)
}
