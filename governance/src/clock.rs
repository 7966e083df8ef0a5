//! Saturating millisecond arithmetic on UTC timestamps.
//!
//! Windows and cooldowns arrive as `u64` milliseconds from config and the
//! public API. These helpers never panic and never wrap: an offset past the
//! representable range clamps to the earliest or latest instant chrono
//! supports.

use chrono::{DateTime, TimeDelta, Utc};

fn delta(ms: u64) -> TimeDelta {
    TimeDelta::try_milliseconds(i64::try_from(ms).unwrap_or(i64::MAX)).unwrap_or(TimeDelta::MAX)
}

/// Start of a window of `window_ms` ending at `now`.
pub fn window_start(now: DateTime<Utc>, window_ms: u64) -> DateTime<Utc> {
    now.checked_sub_signed(delta(window_ms))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `now` plus `ms`.
pub fn after(now: DateTime<Utc>, ms: u64) -> DateTime<Utc> {
    now.checked_add_signed(delta(ms))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
