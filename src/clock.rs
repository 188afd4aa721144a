//! Frame timestamps.
//!
//! Frames carry a [`Timestamp`]: signed microseconds on the wall clock
//! (UNIX epoch). Producers in other processes stamp frames with the same
//! clock, which lets the renderer detect inputs that stopped updating by
//! comparing against "now".

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time in microseconds since the UNIX epoch (8 bytes, Copy).
///
/// # Examples
///
/// ```rust
/// use framelink::clock::Timestamp;
///
/// let t1 = Timestamp::from_millis(1);
/// let t2 = Timestamp::from_micros(500);
///
/// assert_eq!((t1 + t2).micros(), 1500);
/// assert_eq!(format!("{}", t1 + t2), "0.001500s");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The epoch itself.
    pub const ZERO: Self = Self(0);

    /// Smallest representable time.
    pub const MIN: Self = Self(i64::MIN);

    /// Create from microseconds.
    #[inline]
    pub const fn from_micros(us: i64) -> Self {
        Self(us)
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms.saturating_mul(1_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: i64) -> Self {
        Self(s.saturating_mul(1_000_000))
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Self(i64::try_from(d.as_micros()).unwrap_or(i64::MAX)),
            Err(e) => Self(-i64::try_from(e.duration().as_micros()).unwrap_or(i64::MAX)),
        }
    }

    /// Get as microseconds.
    #[inline]
    pub const fn micros(self) -> i64 {
        self.0
    }

    /// Get as milliseconds (truncated toward zero).
    #[inline]
    pub const fn millis(self) -> i64 {
        self.0 / 1_000
    }

    /// Absolute distance between two timestamps.
    #[inline]
    pub fn abs_diff(self, other: Self) -> Duration {
        Duration::from_micros(self.0.abs_diff(other.0))
    }

    /// Saturating addition of a duration.
    #[inline]
    pub fn saturating_add(self, d: Duration) -> Self {
        let us = i64::try_from(d.as_micros()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(us))
    }

    /// Saturating subtraction of a duration.
    #[inline]
    pub fn saturating_sub(self, d: Duration) -> Self {
        let us = i64::try_from(d.as_micros()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(us))
    }
}

impl std::ops::Add for Timestamp {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Timestamp {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl From<i64> for Timestamp {
    fn from(us: i64) -> Self {
        Self(us)
    }
}

impl From<Timestamp> for i64 {
    fn from(t: Timestamp) -> Self {
        t.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:06}s", sign, abs / 1_000_000, abs % 1_000_000)
    }
}
