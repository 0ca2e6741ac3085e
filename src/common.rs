use std::{ops::Deref, time::Duration};

/// Minimum spacing between two unit-quantity admissions, the emission interval.
///
/// A limiter allowing 10 requests per second uses a period of 100 ms.
///
/// # Validation
///
/// - Must be greater than zero
/// - Must fit in `i64` nanoseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(Duration);

impl Period {
    pub(crate) fn as_nanos(&self) -> i64 {
        // bounded by TryFrom
        self.0.as_nanos() as i64
    }
}

impl Deref for Period {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Duration> for Period {
    type Error = &'static str;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        if value.is_zero() {
            Err("Period must be greater than 0")
        } else if value.as_nanos() > i64::MAX as u128 {
            Err("Period must fit in i64 nanoseconds")
        } else {
            Ok(Self(value))
        }
    }
}

/// Extra capacity above the steady-state rate.
///
/// The total burst a fresh bucket admits is `max_burst + 1`. Zero is valid and
/// yields a limiter without burst tolerance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct MaxBurst(u64);

impl Deref for MaxBurst {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for MaxBurst {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value >= i64::MAX as u64 {
            Err("Max burst must be less than i64::MAX")
        } else {
            Ok(Self(value))
        }
    }
}

/// Upper bound on read/compare-and-swap rounds per call under contention.
///
/// Defaults to 10.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MaxAttempts(u32);

impl Default for MaxAttempts {
    fn default() -> Self {
        Self(10)
    }
}

impl Deref for MaxAttempts {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u32> for MaxAttempts {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Max attempts must be at least 1")
        } else {
            Ok(Self(value))
        }
    }
}

/// State of a bucket as observed by a [`limit`](crate::RateLimiter::limit) call.
///
/// The fields map directly onto the usual rate-limit response headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Total burst capacity, `max_burst + 1`.
    pub limit: u64,
    /// Unit quantities currently available.
    pub remaining: u64,
    /// Time until the bucket is fully available again.
    ///
    /// For a rejected call this reflects the bucket as it was before the call.
    pub reset_after: Duration,
    /// Time until a call of the same quantity could succeed.
    ///
    /// `None` when the call was admitted, or when the quantity exceeds the
    /// total burst capacity and no amount of waiting would admit it.
    pub retry_after: Option<Duration>,
}

pub(crate) fn nanos_to_duration(nanos: i64) -> Duration {
    Duration::from_nanos(nanos.max(0) as u64)
}
