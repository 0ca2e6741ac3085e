use std::{
    ops::Deref,
    sync::{Arc, Mutex, PoisonError},
};

use redis::{Client, aio::ConnectionManager};

use crate::GcraError;

/// Namespace under which every bucket key of a [`RedisStore`](super::RedisStore)
/// lives.
///
/// A bucket `key` is stored at `<prefix>:<key>`. The colon is the separator,
/// so the prefix itself must be a single non-empty segment of at most
/// [`RedisKey::MAX_LEN`] bytes without one; the bucket key after it is free
/// form.
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct RedisKey(Arc<str>);

impl RedisKey {
    /// Longest accepted prefix, in bytes.
    pub const MAX_LEN: usize = 255;

    /// The `gcra` namespace used when no prefix is configured.
    pub fn default_prefix() -> Self {
        Self(Arc::from("gcra"))
    }

    pub(crate) fn namespaced(&self, key: &str) -> String {
        format!("{}:{key}", self.0)
    }
}

impl Deref for RedisKey {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RedisKey {
    type Error = GcraError;

    fn try_from(prefix: String) -> Result<Self, Self::Error> {
        let reason = if prefix.is_empty() {
            "prefix is empty"
        } else if prefix.len() > Self::MAX_LEN {
            "prefix is longer than 255 bytes"
        } else if prefix.contains(':') {
            "prefix contains the ':' namespace separator"
        } else {
            return Ok(Self(Arc::from(prefix)));
        };

        Err(GcraError::InvalidRedisKey(format!("{reason}: {prefix:?}")))
    }
}

/// Holds the live [`ConnectionManager`] and the [`Client`] it came from, so a
/// fresh connection can be opened on demand.
pub(crate) struct RedisConnection {
    client: Client,
    connection_manager: Mutex<ConnectionManager>,
}

impl RedisConnection {
    pub(crate) async fn from_client(client: Client) -> Result<Self, GcraError> {
        let connection_manager = client.get_connection_manager().await?;

        Ok(Self {
            client,
            connection_manager: Mutex::new(connection_manager),
        })
    }

    /// Get a [`ConnectionManager`] handle.
    pub(crate) fn get(&self) -> ConnectionManager {
        self.connection_manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    } // end method get

    /// Replace the current connection with a newly opened one.
    pub(crate) async fn reconnect(&self) -> Result<(), GcraError> {
        let fresh = self.client.get_connection_manager().await?;

        *self
            .connection_manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = fresh;

        Ok(())
    } // end method reconnect
} // end impl RedisConnection
