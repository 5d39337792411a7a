//! Time and timestamp helpers.

use chrono::{DateTime, TimeDelta, Utc};

/// UTC timestamp used for receive/send bookkeeping and event times.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether strictly more than `interval` has passed since `last`.
///
/// A missing `last` (never happened) always counts as elapsed.
#[must_use]
pub fn has_elapsed(last: Option<Timestamp>, interval: TimeDelta, now: Timestamp) -> bool {
    last.is_none_or(|last| now - last > interval)
}
