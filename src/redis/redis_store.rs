use std::future::Future;

use redis::{
    Client, ErrorKind, RedisError, RedisResult, ServerErrorKind, Value, aio::ConnectionManager,
};

use crate::{
    GcraError, Store,
    redis::{CAS_SCRIPT, CAS_SCRIPT_SHA, RedisKey},
    store::ttl_millis,
};

use super::{common::RedisConnection, script::SwapOutcome};

/// Configuration for [`RedisStore`].
///
/// # Examples
///
/// ```ignore
/// use gcra::redis::{RedisKey, RedisStoreOptions};
///
/// let options = RedisStoreOptions {
///     prefix: Some(RedisKey::try_from("myapp".to_string())?), // Keys: myapp:<key>
///     reconnect_on_readonly: true,
/// };
/// ```
#[derive(Clone, Debug, Default)]
pub struct RedisStoreOptions {
    /// Optional prefix for all Redis keys.
    ///
    /// Bucket keys are stored as `<prefix>:<key>`. If `None`, defaults to
    /// `"gcra"`. Distinct prefixes let several limiter deployments share one
    /// Redis without colliding.
    pub prefix: Option<RedisKey>,

    /// Open a fresh connection and retry once when Redis answers `READONLY`.
    ///
    /// This happens after a failover when the client is still connected to the
    /// demoted primary. When `false`, the error is returned immediately.
    pub reconnect_on_readonly: bool,
}

/// What to do before the single retry of a failed command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Recovery {
    LoadScript,
    Reconnect,
}

impl Recovery {
    /// `NOSCRIPT` always reloads; `READONLY` reconnects only when enabled.
    pub(crate) fn for_error(err: &RedisError, reconnect_on_readonly: bool) -> Option<Self> {
        match err.kind() {
            ErrorKind::Server(ServerErrorKind::NoScript) => Some(Self::LoadScript),
            ErrorKind::Server(ServerErrorKind::ReadOnly) if reconnect_on_readonly => {
                Some(Self::Reconnect)
            }
            _ => None,
        }
    }
}

/// A [`Store`] backed by Redis.
///
/// # Requirements
///
/// - **Redis version:** >= 2.6.12 (`SET ... NX PX`, Lua scripting)
/// - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
///
/// # Protocol
///
/// - **Read:** `TIME` and `GET` pipelined in one round trip, so `now` comes
///   from the Redis clock rather than the local one
/// - **Set if absent:** `SET key value NX PX ttl`
/// - **Compare and swap:** `EVALSHA` of [`CAS_SCRIPT`]
///
/// Values are the decimal form of the TAT in nanoseconds; expiries are sent in
/// whole milliseconds, rounded up to 1 ms when shorter.
///
/// # Recovery
///
/// Each operation is retried at most once:
///
/// - `NOSCRIPT`: the script is loaded with `SCRIPT LOAD`, then the operation
///   is repeated
/// - `READONLY`: when [`RedisStoreOptions::reconnect_on_readonly`] is set, a
///   new connection is opened, then the operation is repeated
///
/// # Examples
///
/// ```ignore
/// use gcra::redis::{RedisStore, RedisStoreOptions};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let store = RedisStore::new(client, RedisStoreOptions::default()).await?;
/// ```
pub struct RedisStore {
    connection: RedisConnection,
    prefix: RedisKey,
    reconnect_on_readonly: bool,
}

impl RedisStore {
    /// Connect to Redis through `client`.
    pub async fn new(client: Client, options: RedisStoreOptions) -> Result<Self, GcraError> {
        Ok(Self {
            connection: RedisConnection::from_client(client).await?,
            prefix: options.prefix.unwrap_or_else(RedisKey::default_prefix),
            reconnect_on_readonly: options.reconnect_on_readonly,
        })
    } // end constructor

    /// The key prefix in use.
    pub fn prefix(&self) -> &RedisKey {
        &self.prefix
    }

    /// Load [`CAS_SCRIPT`] into the Redis script cache.
    ///
    /// Not required before use: a missing script is loaded on demand.
    pub async fn load_script(&self) -> Result<(), GcraError> {
        let mut connection_manager = self.connection.get();

        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(CAS_SCRIPT)
            .query_async(&mut connection_manager)
            .await?;

        if sha != CAS_SCRIPT_SHA {
            tracing::error!(
                expected = CAS_SCRIPT_SHA,
                actual = %sha,
                "redis.script.mismatch, server computed a different script hash"
            );
        }

        Ok(())
    } // end method load_script

    /// Run `attempt`, performing at most one recovery action and one more
    /// attempt when the first one fails with a recoverable error.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        key: &str,
        mut attempt: F,
    ) -> Result<T, GcraError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let err = match attempt(self.connection.get()).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match Recovery::for_error(&err, self.reconnect_on_readonly) {
            Some(Recovery::LoadScript) => {
                tracing::warn!(key, op, "redis.noscript, loading script and retrying");
                self.load_script().await?;
            }
            Some(Recovery::Reconnect) => {
                tracing::warn!(key, op, "redis.readonly, reconnecting and retrying");
                self.connection.reconnect().await?;
            }
            None => return Err(err.into()),
        }

        Ok(attempt(self.connection.get()).await?)
    } // end method run
}

impl Store for RedisStore {
    async fn get_with_time(&self, key: &str) -> Result<(Option<i64>, i64), GcraError> {
        let redis_key = self.prefix.namespaced(key);

        let ((seconds, microseconds), value) = self
            .run("get_with_time", key, |mut connection_manager| {
                let mut pipe = redis::pipe();
                pipe.cmd("TIME").cmd("GET").arg(&redis_key);

                async move {
                    let reply: RedisResult<((i64, i64), Option<String>)> =
                        pipe.query_async(&mut connection_manager).await;
                    reply
                }
            })
            .await?;

        let now = seconds * 1_000_000_000 + microseconds * 1_000;

        let value = value
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|_| GcraError::InvalidStoredValue {
                        key: key.to_string(),
                        value: raw,
                    })
            })
            .transpose()?;

        Ok((value, now))
    }

    async fn set_if_not_exists_with_ttl(
        &self,
        key: &str,
        value: i64,
        ttl_nanos: i64,
    ) -> Result<bool, GcraError> {
        let redis_key = self.prefix.namespaced(key);
        let ttl_ms = ttl_millis(ttl_nanos);

        let reply = self
            .run("set_if_not_exists_with_ttl", key, |mut connection_manager| {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&redis_key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms);

                async move {
                    let reply: RedisResult<Value> = cmd.query_async(&mut connection_manager).await;
                    reply
                }
            })
            .await?;

        Ok(!matches!(reply, Value::Nil))
    }

    async fn compare_and_set_with_ttl(
        &self,
        key: &str,
        old_value: i64,
        new_value: i64,
        ttl_nanos: i64,
    ) -> Result<bool, GcraError> {
        let redis_key = self.prefix.namespaced(key);
        let ttl_ms = ttl_millis(ttl_nanos);

        let reply = self
            .run("compare_and_set_with_ttl", key, |mut connection_manager| {
                let mut cmd = redis::cmd("EVALSHA");
                cmd.arg(CAS_SCRIPT_SHA)
                    .arg(1)
                    .arg(&redis_key)
                    .arg(old_value)
                    .arg(new_value)
                    .arg(ttl_ms);

                async move {
                    let reply: RedisResult<i64> = cmd.query_async(&mut connection_manager).await;
                    reply
                }
            })
            .await?;

        match SwapOutcome::try_from(reply) {
            Ok(SwapOutcome::Swapped) => Ok(true),
            Ok(SwapOutcome::Missing | SwapOutcome::Mismatch) => Ok(false),
            Err(other) => Err(GcraError::UnexpectedScriptReply(other)),
        }
    }
}
