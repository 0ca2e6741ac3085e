//! The storage contract the limiter coordinates through.
//!
//! A [`Store`] holds one integer per bucket key, the bucket's theoretical
//! arrival time (TAT) in nanoseconds since the UNIX epoch, together with an
//! expiry. Every process sharing a store sees the same buckets, and every
//! `now` handed out comes from the store's own clock so that processes with
//! drifting local clocks still agree on elapsed time.
//!
//! Implementations:
//!
//! - [`LocalStore`](crate::local::LocalStore): in-process, for single-process
//!   deployments and tests
//! - `RedisStore` (`redis-tokio` / `redis-smol` features): shared via Redis

use std::{future::Future, sync::Arc};

use crate::GcraError;

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Storage backend for bucket TATs.
///
/// All three operations act on a single key and must each be atomic with
/// respect to concurrent callers, including callers in other processes.
pub trait Store: Send + Sync {
    /// Read the value stored under `key` and the store's current time, in one
    /// consistent round trip.
    ///
    /// Returns `(value, now_nanos)`; `value` is `None` when the key is absent
    /// or expired.
    fn get_with_time(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<(Option<i64>, i64), GcraError>> + Send;

    /// Store `value` under `key` with an expiry of `ttl_nanos`, only if the key
    /// is absent.
    ///
    /// Returns `false` without touching anything when a value already exists.
    fn set_if_not_exists_with_ttl(
        &self,
        key: &str,
        value: i64,
        ttl_nanos: i64,
    ) -> impl Future<Output = Result<bool, GcraError>> + Send;

    /// Replace the value under `key` with `new_value` and reset its expiry to
    /// `ttl_nanos`, only if it currently equals `old_value`.
    ///
    /// Returns `false` when the key is absent or holds a different value; in
    /// both cases nothing is mutated.
    fn compare_and_set_with_ttl(
        &self,
        key: &str,
        old_value: i64,
        new_value: i64,
        ttl_nanos: i64,
    ) -> impl Future<Output = Result<bool, GcraError>> + Send;
}

impl<S: Store> Store for &S {
    fn get_with_time(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<(Option<i64>, i64), GcraError>> + Send {
        (**self).get_with_time(key)
    }

    fn set_if_not_exists_with_ttl(
        &self,
        key: &str,
        value: i64,
        ttl_nanos: i64,
    ) -> impl Future<Output = Result<bool, GcraError>> + Send {
        (**self).set_if_not_exists_with_ttl(key, value, ttl_nanos)
    }

    fn compare_and_set_with_ttl(
        &self,
        key: &str,
        old_value: i64,
        new_value: i64,
        ttl_nanos: i64,
    ) -> impl Future<Output = Result<bool, GcraError>> + Send {
        (**self).compare_and_set_with_ttl(key, old_value, new_value, ttl_nanos)
    }
}

impl<S: Store> Store for Arc<S> {
    fn get_with_time(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<(Option<i64>, i64), GcraError>> + Send {
        (**self).get_with_time(key)
    }

    fn set_if_not_exists_with_ttl(
        &self,
        key: &str,
        value: i64,
        ttl_nanos: i64,
    ) -> impl Future<Output = Result<bool, GcraError>> + Send {
        (**self).set_if_not_exists_with_ttl(key, value, ttl_nanos)
    }

    fn compare_and_set_with_ttl(
        &self,
        key: &str,
        old_value: i64,
        new_value: i64,
        ttl_nanos: i64,
    ) -> impl Future<Output = Result<bool, GcraError>> + Send {
        (**self).compare_and_set_with_ttl(key, old_value, new_value, ttl_nanos)
    }
}

/// Convert an expiry to whole milliseconds, never below 1 ms.
///
/// A zero or negative expiry is either rejected by the backend or means the
/// key never expires, so sub-millisecond values round up instead of down.
pub(crate) fn ttl_millis(ttl_nanos: i64) -> i64 {
    (ttl_nanos / NANOS_PER_MILLI).max(1)
}
