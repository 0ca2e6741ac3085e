//! Redis-backed store.
//!
//! [`RedisStore`] shares bucket state between any number of processes through
//! a single Redis (or Redis-compatible) server. The compare-and-swap step runs
//! as a Lua script so it is one indivisible operation on the server.

mod common;
pub use common::*;

mod script;
pub use script::{CAS_SCRIPT, CAS_SCRIPT_SHA};

mod redis_store;
pub use redis_store::*;
