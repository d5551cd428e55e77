//! Humanized relative time, used in default job names.

use crate::types::Timestamp;

/// Humanized difference between a past instant and `now`,
/// e.g. "3 hours ago". Future instants clamp to "just now".
pub fn ago(from: Timestamp, now: Timestamp) -> String {
    let seconds = (now - from).num_seconds();
    if seconds < 0 {
        return "just now".to_string();
    }

    const UNITS: [(i64, &str); 5] = [
        (60, "second"),
        (60, "minute"),
        (24, "hour"),
        (30, "day"),
        (12, "month"),
    ];

    let mut amount = seconds;
    let mut unit = "second";
    for (factor, name) in UNITS {
        unit = name;
        if amount < factor {
            break;
        }
        amount /= factor;
        // Past the last factor the remaining unit is years.
        unit = "year";
    }

    let plural = if amount == 1 { "" } else { "s" };
    format!("{amount} {unit}{plural} ago")
}
