use std::time::{SystemTime, UNIX_EPOCH};

use crate::GcraError;

/// Time source for a [`LocalStore`](crate::local::LocalStore).
///
/// Returns nanoseconds since the UNIX epoch. Implementors must be thread-safe.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since the UNIX epoch.
    fn now(&self) -> Result<i64, GcraError>;
}

/// Wall clock of the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<i64, GcraError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .map_err(|_| GcraError::ClockError)
    }
}
