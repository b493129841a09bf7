//! Stream time values
//!
//! `StreamTime` is the single time type used for positions and durations
//! throughout Tome. It stores a signed number of nanoseconds; every other unit
//! is derived on demand.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::time::Duration;

/// Units a `StreamTime` can be expressed in, ordered from finest to coarsest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Nanoseconds (canonical)
    #[serde(rename = "ns")]
    Nanoseconds,
    /// Milliseconds
    #[serde(rename = "ms")]
    Milliseconds,
    /// Seconds
    #[serde(rename = "s")]
    Seconds,
    /// Minutes
    #[serde(rename = "m")]
    Minutes,
    /// Hours
    #[serde(rename = "h")]
    Hours,
}

impl TimeUnit {
    /// All units, finest first
    pub const ALL: [TimeUnit; 5] = [
        TimeUnit::Nanoseconds,
        TimeUnit::Milliseconds,
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
    ];

    /// Number of nanoseconds in one of this unit
    pub const fn nanos(self) -> i64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
            Self::Minutes => 60 * 1_000_000_000,
            Self::Hours => 3_600 * 1_000_000_000,
        }
    }

    /// Next coarser unit, `None` for hours
    pub const fn coarser(self) -> Option<TimeUnit> {
        match self {
            Self::Nanoseconds => Some(Self::Milliseconds),
            Self::Milliseconds => Some(Self::Seconds),
            Self::Seconds => Some(Self::Minutes),
            Self::Minutes => Some(Self::Hours),
            Self::Hours => None,
        }
    }

    /// Short symbol (`ns`, `ms`, `s`, `m`, `h`)
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
        }
    }

    /// Parse a unit symbol
    pub fn from_symbol(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|unit| unit.symbol() == s)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A signed stream position or duration
///
/// Arithmetic is only defined between `StreamTime` values; raw integers must go
/// through a constructor with an explicit unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StreamTime {
    nanos: i64,
}

impl StreamTime {
    /// Zero time
    pub const ZERO: StreamTime = StreamTime { nanos: 0 };

    /// Create a time from a magnitude in the given unit
    pub const fn new(magnitude: i64, unit: TimeUnit) -> Self {
        Self {
            nanos: magnitude.saturating_mul(unit.nanos()),
        }
    }

    /// Create a time from nanoseconds
    pub const fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    /// Create a time from milliseconds
    pub const fn from_millis(millis: i64) -> Self {
        Self::new(millis, TimeUnit::Milliseconds)
    }

    /// Create a time from seconds
    pub const fn from_secs(secs: i64) -> Self {
        Self::new(secs, TimeUnit::Seconds)
    }

    /// Replace the value with a magnitude in the given unit
    pub fn set(&mut self, magnitude: i64, unit: TimeUnit) {
        *self = Self::new(magnitude, unit);
    }

    /// Canonical nanosecond value
    pub const fn as_nanos(self) -> i64 {
        self.nanos
    }

    /// Whole number of `unit` contained in this time
    ///
    /// Never rounds up: `get(u) * u.nanos() <= nanos < (get(u) + 1) * u.nanos()`
    /// for positive and negative values alike.
    pub const fn get(self, unit: TimeUnit) -> i64 {
        self.nanos.div_euclid(unit.nanos())
    }

    /// Value in `unit` left over once every coarser unit has been taken out
    ///
    /// `StreamTime::from_secs(200)` has a clock value of 20 seconds, 3 minutes
    /// and 0 hours.
    pub fn clock_value(self, unit: TimeUnit) -> i64 {
        let total = self.get(unit);
        match unit.coarser() {
            Some(coarser) => total.rem_euclid(coarser.nanos() / unit.nanos()),
            None => total,
        }
    }

    /// Absolute value
    pub const fn abs(self) -> Self {
        Self {
            nanos: self.nanos.saturating_abs(),
        }
    }

    /// Whether this time is below zero
    pub const fn is_negative(self) -> bool {
        self.nanos < 0
    }

    /// Clamp into `[min, max]`
    pub fn clamp_to(self, min: StreamTime, max: StreamTime) -> Self {
        Ord::clamp(self, min, max)
    }
}

impl Add for StreamTime {
    type Output = StreamTime;

    fn add(self, rhs: StreamTime) -> StreamTime {
        StreamTime {
            nanos: self.nanos.saturating_add(rhs.nanos),
        }
    }
}

impl AddAssign for StreamTime {
    fn add_assign(&mut self, rhs: StreamTime) {
        *self = *self + rhs;
    }
}

impl Sub for StreamTime {
    type Output = StreamTime;

    fn sub(self, rhs: StreamTime) -> StreamTime {
        StreamTime {
            nanos: self.nanos.saturating_sub(rhs.nanos),
        }
    }
}

impl SubAssign for StreamTime {
    fn sub_assign(&mut self, rhs: StreamTime) {
        *self = *self - rhs;
    }
}

impl Neg for StreamTime {
    type Output = StreamTime;

    fn neg(self) -> StreamTime {
        StreamTime {
            nanos: self.nanos.saturating_neg(),
        }
    }
}

impl Sum for StreamTime {
    fn sum<I: Iterator<Item = StreamTime>>(iter: I) -> StreamTime {
        iter.fold(StreamTime::ZERO, Add::add)
    }
}

impl From<Duration> for StreamTime {
    fn from(duration: Duration) -> Self {
        Self {
            nanos: i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<StreamTime> for Duration {
    type Error = NegativeStreamTime;

    fn try_from(time: StreamTime) -> Result<Self, Self::Error> {
        u64::try_from(time.nanos)
            .map(Duration::from_nanos)
            .map_err(|_| NegativeStreamTime(time))
    }
}

/// Returned when converting a negative `StreamTime` into a `Duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert negative stream time {0} into a duration")]
pub struct NegativeStreamTime(pub StreamTime);

/// Formats as `[-][h:]mm:ss`
impl fmt::Display for StreamTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let magnitude = self.abs();
        let hours = magnitude.clock_value(TimeUnit::Hours);
        let minutes = magnitude.clock_value(TimeUnit::Minutes);
        let seconds = magnitude.clock_value(TimeUnit::Seconds);

        if hours > 0 {
            write!(f, "{sign}{hours}:{minutes:02}:{seconds:02}")
        } else {
            write!(f, "{sign}{minutes:02}:{seconds:02}")
        }
    }
}
