//! GCRA admission decisions on top of a [`Store`].

use crate::{
    GcraError, MaxAttempts, MaxBurst, Period, RateLimitInfo, Store, common::nanos_to_duration,
};

/// Configuration for [`RateLimiter`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gcra::{MaxAttempts, MaxBurst, Period, RateLimiterOptions};
///
/// // 10 requests per second, bursts of up to 5
/// let options = RateLimiterOptions {
///     period: Period::try_from(Duration::from_millis(100)).unwrap(),
///     max_burst: MaxBurst::try_from(4).unwrap(),
///     max_attempts: MaxAttempts::default(),
/// };
/// ```
#[derive(Clone, Debug)]
pub struct RateLimiterOptions {
    /// Emission interval per unit of quantity.
    pub period: Period,
    /// Capacity above the steady-state rate.
    pub max_burst: MaxBurst,
    /// Bound on read/compare-and-swap rounds per call under contention.
    pub max_attempts: MaxAttempts,
}

/// Distributed rate limiter implementing the Generic Cell Rate Algorithm.
///
/// Each bucket is a single theoretical arrival time (TAT) in the [`Store`].
/// A call reads the TAT together with the store's clock, decides, and when the
/// request is admitted writes the advanced TAT back with a compare-and-swap
/// against the value it read. Losing that race means another caller admitted
/// first; the decision is recomputed from a fresh read.
///
/// The limiter holds no per-bucket state and is safe to share between tasks.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gcra::{LocalStore, MaxAttempts, MaxBurst, Period, RateLimiter, RateLimiterOptions};
///
/// # smol::block_on(async {
/// let limiter = RateLimiter::new(
///     LocalStore::new(),
///     RateLimiterOptions {
///         period: Period::try_from(Duration::from_secs(1)).unwrap(),
///         max_burst: MaxBurst::try_from(2).unwrap(),
///         max_attempts: MaxAttempts::default(),
///     },
/// );
///
/// let (limited, info) = limiter.limit("user_123", 1).await.unwrap();
/// assert!(!limited);
/// assert_eq!(info.limit, 3);
/// assert_eq!(info.remaining, 2);
/// # });
/// ```
pub struct RateLimiter<S: Store> {
    store: S,
    period: i64,
    limit: u64,
    delay_variation_tolerance: i64,
    max_attempts: u32,
}

struct Decision {
    limited: bool,
    info: RateLimitInfo,
    new_tat: i64,
    ttl: i64,
}

impl<S: Store> RateLimiter<S> {
    /// Create a limiter persisting bucket state in `store`.
    pub fn new(store: S, options: RateLimiterOptions) -> Self {
        let period = options.period.as_nanos();
        let limit = *options.max_burst + 1;

        Self {
            store,
            period,
            limit,
            delay_variation_tolerance: period.saturating_mul(limit as i64),
            max_attempts: *options.max_attempts,
        }
    } // end constructor

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Total burst capacity, `max_burst + 1`.
    pub fn limit_capacity(&self) -> u64 {
        self.limit
    }

    /// Emission interval per unit of quantity.
    pub fn period(&self) -> std::time::Duration {
        nanos_to_duration(self.period)
    }

    /// The burst window, `period × limit`.
    pub fn delay_variation_tolerance(&self) -> std::time::Duration {
        nanos_to_duration(self.delay_variation_tolerance)
    }

    /// Decide whether a request costing `quantity` may proceed for `key`.
    ///
    /// Returns `(limited, info)`: `limited` is `true` when the request was
    /// rejected. A rejected request leaves the bucket untouched.
    ///
    /// # Errors
    ///
    /// - [`GcraError::InvalidQuantity`] when `quantity` is zero
    /// - [`GcraError::StoreUpdateFailed`] when every attempt lost its
    ///   compare-and-swap to a concurrent caller
    /// - any store error, unchanged
    pub async fn limit(&self, key: &str, quantity: u64) -> Result<(bool, RateLimitInfo), GcraError> {
        if quantity == 0 {
            return Err(GcraError::InvalidQuantity(quantity));
        }

        for attempt in 1..=self.max_attempts {
            let (tat, now) = self.store.get_with_time(key).await?;
            let decision = self.decide(tat, now, quantity);

            if decision.limited {
                return Ok((true, decision.info));
            }

            if self.persist(key, tat, decision.new_tat, decision.ttl).await? {
                return Ok((false, decision.info));
            }

            tracing::debug!(key, attempt, "gcra.limit.conflict, concurrent update, recomputing");
        }

        Err(self.exhausted(key))
    } // end method limit

    /// Mark `key` as fully consumed.
    ///
    /// Subsequent calls are rejected until the bucket regenerates, exactly as
    /// if a full burst had just been admitted.
    pub async fn mark_overlimit(&self, key: &str) -> Result<(), GcraError> {
        for attempt in 1..=self.max_attempts {
            let (tat, now) = self.store.get_with_time(key).await?;
            let new_tat = now.saturating_add(self.delay_variation_tolerance);

            if self
                .persist(key, tat, new_tat, self.delay_variation_tolerance)
                .await?
            {
                return Ok(());
            }

            tracing::debug!(key, attempt, "gcra.mark_overlimit.conflict, concurrent update, retrying");
        }

        Err(self.exhausted(key))
    } // end method mark_overlimit

    fn decide(&self, tat: Option<i64>, now: i64, quantity: u64) -> Decision {
        let tat_or_now = tat.map_or(now, |tat| tat.max(now));
        let increment = self.period.saturating_mul(quantity.min(i64::MAX as u64) as i64);

        let new_tat = tat_or_now.saturating_add(increment);
        let allow_at = new_tat.saturating_sub(self.delay_variation_tolerance);
        let diff = now.saturating_sub(allow_at);

        if diff < 0 {
            let reset_after = tat_or_now - now;
            let retry_after = (increment <= self.delay_variation_tolerance)
                .then(|| nanos_to_duration(diff.saturating_neg()));

            return Decision {
                limited: true,
                info: RateLimitInfo {
                    limit: self.limit,
                    remaining: self.remaining(reset_after),
                    reset_after: nanos_to_duration(reset_after),
                    retry_after,
                },
                new_tat: tat_or_now,
                ttl: reset_after,
            };
        }

        let reset_after = new_tat - now;

        Decision {
            limited: false,
            info: RateLimitInfo {
                limit: self.limit,
                remaining: self.remaining(reset_after),
                reset_after: nanos_to_duration(reset_after),
                retry_after: None,
            },
            new_tat,
            ttl: reset_after,
        }
    }

    fn remaining(&self, reset_after: i64) -> u64 {
        (self.delay_variation_tolerance.saturating_sub(reset_after) / self.period).max(0) as u64
    }

    async fn persist(
        &self,
        key: &str,
        tat: Option<i64>,
        new_tat: i64,
        ttl: i64,
    ) -> Result<bool, GcraError> {
        match tat {
            Some(old_tat) => {
                self.store
                    .compare_and_set_with_ttl(key, old_tat, new_tat, ttl)
                    .await
            }
            None => {
                self.store
                    .set_if_not_exists_with_ttl(key, new_tat, ttl)
                    .await
            }
        }
    }

    fn exhausted(&self, key: &str) -> GcraError {
        tracing::error!(key, attempts = self.max_attempts, "gcra.store.exhausted, giving up");

        GcraError::StoreUpdateFailed {
            key: key.to_string(),
            attempts: self.max_attempts,
        }
    }
}
