/// Error type for this crate.
///
/// Rate limiting outcomes are never errors: both admitted and rejected
/// requests come back as `Ok`. These variants cover infrastructure faults and
/// invalid input only.
#[derive(Debug, thiserror::Error)]
pub enum GcraError {
    /// Redis error.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// The Redis key prefix was rejected.
    #[error("invalid redis key prefix, {0}")]
    InvalidRedisKey(String),

    /// A request quantity of zero was passed to the limiter.
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(u64),

    /// The value stored under a bucket key is not a TAT.
    #[error("stored value for key '{key}' is not an integer: {value:?}")]
    InvalidStoredValue {
        /// Bucket key.
        key: String,
        /// Raw value read from the store.
        value: String,
    },

    /// The compare-and-swap procedure answered with an unknown code.
    #[error("unexpected reply from compare-and-swap script: {0}")]
    UnexpectedScriptReply(i64),

    /// The clock reported a time before the UNIX epoch.
    #[error("clock reported a time before the UNIX epoch")]
    ClockError,

    /// Every attempt to persist a new TAT lost its compare-and-swap race.
    #[error("failed to store updated rate limit data for key '{key}' after {attempts} attempts")]
    StoreUpdateFailed {
        /// Bucket key.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },
}
