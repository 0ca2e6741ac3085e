//! In-process store.
//!
//! [`LocalStore`] keeps bucket TATs in a [`DashMap`](dashmap::DashMap) within
//! the current process. Each store operation runs under the map's shard lock
//! for its key, which gives the same single-step atomicity the Redis script
//! provides, without a network hop.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** Safe for concurrent use across threads and tasks
//! - **Process-scoped:** State is not shared across processes
//! - **Bounded memory:** Expired entries are removed when read, and the map is
//!   swept every [`DEFAULT_PURGE_INTERVAL`] inserts; [`LocalStore::purge_expired`]
//!   sweeps on demand
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use gcra::{LocalStore, MaxAttempts, MaxBurst, Period, RateLimiter, RateLimiterOptions};
//!
//! # smol::block_on(async {
//! let limiter = RateLimiter::new(
//!     LocalStore::new(),
//!     RateLimiterOptions {
//!         period: Period::try_from(Duration::from_millis(100)).unwrap(),
//!         max_burst: MaxBurst::default(),
//!         max_attempts: MaxAttempts::default(),
//!     },
//! );
//!
//! let (limited, _) = limiter.limit("api_endpoint", 1).await.unwrap();
//! assert!(!limited);
//!
//! // No burst tolerance: the next request within 100ms is rejected.
//! let (limited, info) = limiter.limit("api_endpoint", 1).await.unwrap();
//! assert!(limited);
//! assert!(info.retry_after.is_some());
//! # });
//! ```

mod clock;
pub use clock::*;

mod local_store;
pub use local_store::*;
