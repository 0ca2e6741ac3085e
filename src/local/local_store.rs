use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    GcraError, Store,
    common::nanos_to_duration,
    local::{Clock, SystemClock},
    store::ttl_millis,
};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Successful inserts between two sweeps of expired entries.
pub const DEFAULT_PURGE_INTERVAL: u64 = 1024;

#[derive(Clone, Copy, Debug)]
struct StoredTat {
    value: i64,
    expires_at: i64,
}

impl StoredTat {
    fn is_live(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

/// In-process [`Store`] backed by a [`DashMap`].
///
/// Expiries use the same millisecond granularity as the Redis store, so a
/// limiter behaves identically on either backend.
///
/// Expired entries are dropped when a read finds them, and the whole map is
/// swept every [`DEFAULT_PURGE_INTERVAL`] successful inserts (see
/// [`LocalStore::with_purge_interval`]). Memory therefore stays bounded by the
/// keys live within one sweep interval.
#[derive(Debug)]
pub struct LocalStore<C: Clock = SystemClock> {
    entries: DashMap<String, StoredTat>,
    clock: C,
    inserts: AtomicU64,
    purge_interval: u64,
}

impl LocalStore {
    /// Create an empty store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> LocalStore<C> {
    /// Create an empty store driven by `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            inserts: AtomicU64::new(0),
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }

    /// Sweep expired entries every `inserts` successful inserts instead of
    /// every [`DEFAULT_PURGE_INTERVAL`]. `0` turns the sweep off, leaving
    /// [`LocalStore::purge_expired`] to the caller.
    pub fn with_purge_interval(mut self, inserts: u64) -> Self {
        self.purge_interval = inserts;
        self
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining time to live of `key`, or `None` if it is absent or expired.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>, GcraError> {
        let now = self.clock.now()?;

        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| nanos_to_duration(entry.expires_at - now)))
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize, GcraError> {
        let now = self.clock.now()?;
        let before = self.entries.len();

        self.entries.retain(|_, entry| entry.is_live(now));

        Ok(before.saturating_sub(self.entries.len()))
    } // end method purge_expired

    fn sweep_if_due(&self, now: i64) {
        if self.purge_interval == 0 {
            return;
        }

        let inserts = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if inserts % self.purge_interval != 0 {
            return;
        }

        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));

        tracing::debug!(
            removed = before.saturating_sub(self.entries.len()),
            "local.store.sweep, dropped expired entries"
        );
    }

    fn expires_at(now: i64, ttl_nanos: i64) -> i64 {
        now.saturating_add(ttl_millis(ttl_nanos).saturating_mul(NANOS_PER_MILLI))
    }
}

impl<C: Clock> Store for LocalStore<C> {
    async fn get_with_time(&self, key: &str) -> Result<(Option<i64>, i64), GcraError> {
        let now = self.clock.now()?;

        let stored = self.entries.get(key).map(|entry| *entry);

        match stored {
            Some(stored) if stored.is_live(now) => Ok((Some(stored.value), now)),
            Some(_) => {
                self.entries.remove_if(key, |_, entry| !entry.is_live(now));
                Ok((None, now))
            }
            None => Ok((None, now)),
        }
    }

    async fn set_if_not_exists_with_ttl(
        &self,
        key: &str,
        value: i64,
        ttl_nanos: i64,
    ) -> Result<bool, GcraError> {
        let now = self.clock.now()?;
        let stored = StoredTat {
            value,
            expires_at: Self::expires_at(now, ttl_nanos),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    return Ok(false);
                }

                entry.insert(stored);
            }
            Entry::Vacant(entry) => {
                entry.insert(stored);
            }
        }

        // The entry guard is released above; sweeping takes every shard lock.
        self.sweep_if_due(now);

        Ok(true)
    }

    async fn compare_and_set_with_ttl(
        &self,
        key: &str,
        old_value: i64,
        new_value: i64,
        ttl_nanos: i64,
    ) -> Result<bool, GcraError> {
        let now = self.clock.now()?;

        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };

        if !entry.is_live(now) || entry.value != old_value {
            return Ok(false);
        }

        *entry = StoredTat {
            value: new_value,
            expires_at: Self::expires_at(now, ttl_nanos),
        };

        Ok(true)
    }
}
