#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod rate_limiter;
pub use rate_limiter::*;

mod store;
pub use store::Store;

pub mod local;
pub use local::{Clock, LocalStore, SystemClock};

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;

mod error;
pub use error::*;

mod common;
pub use common::{MaxAttempts, MaxBurst, Period, RateLimitInfo};

#[cfg(test)]
mod tests;
