use std::{sync::atomic::Ordering, time::Duration};

use super::{
    fixtures::{AlwaysConflictingStore, RacingStore, limiter, manual_store},
    runtime::block_on,
};
use crate::{GcraError, MaxAttempts, MaxBurst, Period, RateLimiter, RateLimiterOptions, Store};

const SECOND: Duration = Duration::from_secs(1);

#[test]
fn derived_configuration() {
    let (store, _clock) = manual_store();
    let limiter = limiter(store, Duration::from_millis(100), 4);

    assert_eq!(limiter.limit_capacity(), 5);
    assert_eq!(limiter.period(), Duration::from_millis(100));
    assert_eq!(limiter.delay_variation_tolerance(), Duration::from_millis(500));
}

#[test]
fn gcra_sequence_on_one_key() {
    block_on(async {
        let (store, clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);

        // More than the total burst capacity: can never succeed.
        let (limited, info) = limiter.limit("k", 4).await.unwrap();
        assert!(limited);
        assert_eq!(info.limit, 3);
        assert_eq!(info.remaining, 3, "bucket must be untouched");
        assert_eq!(info.reset_after, Duration::ZERO);
        assert_eq!(info.retry_after, None);

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
        assert_eq!(info.remaining, 2);
        assert_eq!(info.reset_after, SECOND);
        assert_eq!(info.retry_after, None);

        clock.advance(Duration::from_millis(10));

        let (limited, info) = limiter.limit("k", 2).await.unwrap();
        assert!(!limited);
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_after, Duration::from_millis(2990));

        clock.advance(Duration::from_millis(10));

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(limited);
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_after, Duration::from_millis(2980));
        assert_eq!(info.retry_after, Some(Duration::from_millis(980)));

        clock.advance(SECOND);

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_after, Duration::from_millis(2980));
        assert_eq!(info.retry_after, None);
    });
}

#[test]
fn rejected_request_does_not_write() {
    block_on(async {
        let (store, _clock) = manual_store();
        let limiter = limiter(store, SECOND, 0);

        limiter.limit("k", 1).await.unwrap();
        let (before, _) = limiter.store().get_with_time("k").await.unwrap();
        let ttl_before = limiter.store().ttl("k").unwrap();

        let (limited, _) = limiter.limit("k", 1).await.unwrap();
        assert!(limited);

        let (after, _) = limiter.store().get_with_time("k").await.unwrap();
        assert_eq!(before, after);
        assert_eq!(ttl_before, limiter.store().ttl("k").unwrap());
    });
}

#[test]
fn oversized_quantity_on_fresh_bucket_leaves_no_state() {
    block_on(async {
        let (store, _clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);

        let (limited, _) = limiter.limit("k", 10).await.unwrap();
        assert!(limited);
        assert!(limiter.store().is_empty());
    });
}

#[test]
fn oversized_quantity_on_used_bucket_has_no_retry_after() {
    block_on(async {
        let (store, _clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);

        limiter.limit("k", 1).await.unwrap();

        let (limited, info) = limiter.limit("k", 4).await.unwrap();
        assert!(limited);
        assert_eq!(info.remaining, 2);
        assert_eq!(info.reset_after, SECOND);
        assert_eq!(info.retry_after, None);
    });
}

#[test]
fn exact_capacity_quantity_is_admitted() {
    block_on(async {
        let (store, _clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);

        let (limited, info) = limiter.limit("k", 3).await.unwrap();
        assert!(!limited);
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_after, Duration::from_secs(3));
    });
}

#[test]
fn zero_max_burst_admits_one_per_period() {
    block_on(async {
        let (store, clock) = manual_store();
        let limiter = limiter(store, Duration::from_millis(100), 0);

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
        assert_eq!(info.limit, 1);
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_after, Duration::from_millis(100));

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(limited);
        assert_eq!(info.retry_after, Some(Duration::from_millis(100)));

        clock.advance(Duration::from_millis(100));

        let (limited, _) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
    });
}

#[test]
fn bucket_regenerates_after_reset_after() {
    block_on(async {
        let (store, clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);

        let (_, info) = limiter.limit("k", 3).await.unwrap();
        assert_eq!(info.remaining, 0);

        clock.advance(info.reset_after);

        assert_eq!(limiter.store().get_with_time("k").await.unwrap().0, None);

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
        assert_eq!(info.remaining, 2);
    });
}

#[test]
fn partial_regeneration_restores_remaining() {
    block_on(async {
        let (store, clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);

        limiter.limit("k", 3).await.unwrap();
        clock.advance(Duration::from_millis(1500));

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
        assert_eq!(info.reset_after, Duration::from_millis(2500));
        assert_eq!(info.remaining, 0);

        clock.advance(Duration::from_millis(500));

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
        assert_eq!(info.reset_after, Duration::from_secs(3));
        assert_eq!(info.remaining, 0);
    });
}

#[test]
fn stored_ttl_matches_reset_after() {
    block_on(async {
        let (store, _clock) = manual_store();
        let limiter = limiter(store, Duration::from_millis(250), 3);

        let (_, info) = limiter.limit("k", 2).await.unwrap();

        assert_eq!(limiter.store().ttl("k").unwrap(), Some(info.reset_after));
    });
}

#[test]
fn keys_are_independent() {
    block_on(async {
        let (store, _clock) = manual_store();
        let limiter = limiter(store, SECOND, 0);

        assert!(!limiter.limit("a", 1).await.unwrap().0);
        assert!(limiter.limit("a", 1).await.unwrap().0);

        assert!(!limiter.limit("b", 1).await.unwrap().0);
    });
}

#[test]
fn zero_quantity_is_rejected_as_invalid() {
    block_on(async {
        let (store, _clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);

        assert!(matches!(
            limiter.limit("k", 0).await,
            Err(GcraError::InvalidQuantity(0))
        ));
        assert!(limiter.store().is_empty());
    });
}

#[test]
fn mark_overlimit_consumes_whole_burst() {
    block_on(async {
        let (store, _clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);

        limiter.mark_overlimit("k").await.unwrap();

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(limited);
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_after, Duration::from_secs(3));
        assert_eq!(info.retry_after, Some(SECOND));
    });
}

#[test]
fn mark_overlimit_on_used_bucket() {
    block_on(async {
        let (store, clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);

        limiter.limit("k", 1).await.unwrap();
        limiter.mark_overlimit("k").await.unwrap();

        let (limited, _) = limiter.limit("k", 1).await.unwrap();
        assert!(limited);

        clock.advance(SECOND);

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
        assert_eq!(info.remaining, 0);
    });
}

#[test]
fn lost_compare_and_swap_recomputes_from_fresh_state() {
    block_on(async {
        let (store, _clock) = manual_store();
        let store = RacingStore::new(store, Duration::from_secs(2));
        let limiter = limiter(store, SECOND, 3);

        // Seed the bucket so the next admission goes through compare-and-swap.
        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
        assert_eq!(info.remaining, 1, "interloper consumed 2 before this write landed");
        assert_eq!(limiter.store().lost_writes.load(Ordering::SeqCst), 1);

        let (limited, info) = limiter.limit("k", 1).await.unwrap();
        assert!(!limited);
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_after, Duration::from_secs(4));
    });
}

#[test]
fn lost_compare_and_swap_can_turn_into_rejection() {
    block_on(async {
        let (store, _clock) = manual_store();
        let limiter = limiter(store, SECOND, 2);
        limiter.limit("k", 1).await.unwrap();

        let store = RacingStore::new(limiter.store(), Duration::from_secs(2));
        let racing = self::limiter(store, SECOND, 2);

        let (limited, info) = racing.limit("k", 1).await.unwrap();
        assert!(limited, "bucket filled by the interloper");
        assert_eq!(info.remaining, 0);
        assert_eq!(info.retry_after, Some(SECOND));
        assert_eq!(racing.store().lost_writes.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn exhausted_attempts_surface_store_update_failed() {
    block_on(async {
        let (store, _clock) = manual_store();
        let store = AlwaysConflictingStore {
            inner: store,
            writes: Default::default(),
        };
        let limiter = RateLimiter::new(
            store,
            RateLimiterOptions {
                period: Period::try_from(SECOND).unwrap(),
                max_burst: MaxBurst::try_from(2).unwrap(),
                max_attempts: MaxAttempts::try_from(4).unwrap(),
            },
        );

        let err = limiter.limit("k", 1).await.unwrap_err();
        assert!(matches!(
            err,
            GcraError::StoreUpdateFailed { ref key, attempts: 4 } if key == "k"
        ));
        assert_eq!(limiter.store().writes.load(Ordering::SeqCst), 4);

        assert!(matches!(
            limiter.mark_overlimit("k").await,
            Err(GcraError::StoreUpdateFailed { attempts: 4, .. })
        ));
    });
}

#[test]
fn rejection_never_touches_conflicting_store() {
    block_on(async {
        let (store, _clock) = manual_store();
        let store = AlwaysConflictingStore {
            inner: store,
            writes: Default::default(),
        };
        let limiter = limiter(store, SECOND, 2);

        let (limited, _) = limiter.limit("k", 5).await.unwrap();
        assert!(limited);
        assert_eq!(limiter.store().writes.load(Ordering::SeqCst), 0);
    });
}
