//! Cache durations.
//!
//! A duration is given either as a number of minutes or as the instant the
//! entry should expire at. Both normalize to minutes-from-now; anything that
//! does not lie in the future normalizes to "no duration", which the
//! repository treats as "do not store".

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Minutes a forever entry lives in stores without native persistence (~10 years).
pub const FOREVER_MINUTES: f64 = 5_256_000.0;

/// How long a cache entry should live.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expiry {
    /// Relative duration in (possibly fractional) minutes.
    Minutes(f64),
    /// Absolute point in time.
    At(DateTime<Utc>),
}

impl Expiry {
    /// Minutes from `now`, or `None` when the entry would already be stale.
    pub fn minutes(&self, now: DateTime<Utc>) -> Option<f64> {
        let minutes = match *self {
            Expiry::Minutes(minutes) => minutes,
            Expiry::At(at) => (at - now).num_milliseconds() as f64 / 1000.0 / 60.0,
        };
        (minutes * 60.0 > 0.0).then_some(minutes)
    }

    /// Same as [`Expiry::minutes`], defaulting to zero.
    pub fn minutes_or_zero(&self, now: DateTime<Utc>) -> f64 {
        self.minutes(now).unwrap_or(0.0)
    }
}

impl From<f64> for Expiry {
    fn from(minutes: f64) -> Self {
        Expiry::Minutes(minutes)
    }
}

impl From<i32> for Expiry {
    fn from(minutes: i32) -> Self {
        Expiry::Minutes(minutes as f64)
    }
}

impl From<i64> for Expiry {
    fn from(minutes: i64) -> Self {
        Expiry::Minutes(minutes as f64)
    }
}

impl From<u32> for Expiry {
    fn from(minutes: u32) -> Self {
        Expiry::Minutes(minutes as f64)
    }
}

impl From<u64> for Expiry {
    fn from(minutes: u64) -> Self {
        Expiry::Minutes(minutes as f64)
    }
}

impl From<Duration> for Expiry {
    fn from(duration: Duration) -> Self {
        Expiry::Minutes(duration.as_secs_f64() / 60.0)
    }
}

impl From<DateTime<Utc>> for Expiry {
    fn from(at: DateTime<Utc>) -> Self {
        Expiry::At(at)
    }
}

/// Expiration timestamp (unix seconds) for an entry written at `now_seconds`.
pub fn expiration_timestamp(now_seconds: f64, minutes: f64) -> i64 {
    (now_seconds + minutes * 60.0).floor() as i64
}

/// Longest TTL handed to a backend, in seconds.
pub const MAX_TTL_SECONDS: u64 = FOREVER_MINUTES as u64 * 60;

/// TTL in whole seconds for backends that reject zero or negative TTLs.
///
/// Clamped to `1..=MAX_TTL_SECONDS`.
pub fn ttl_seconds(minutes: f64) -> u64 {
    let seconds = (minutes * 60.0).floor();
    if seconds.is_nan() || seconds < 1.0 {
        1
    } else {
        seconds.min(MAX_TTL_SECONDS as f64) as u64
    }
}
