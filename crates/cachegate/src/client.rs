//! # Cache Client
//!
//! Typed get/set/delete/list/TTL operations over a pooled Redis connection.
//! Every operation checks out one connection for its whole duration and
//! forwards to a single remote command (or one transaction for
//! [`CacheClient::replace_list`]). Failures are returned as-is, tagged with
//! the command that failed; nothing is retried.

use redis::aio::ConnectionLike;
use redis::{AsyncCommands, Cmd};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::expiry::{self, Expiry, Ttl};
use crate::handle::{CacheConnection, CacheHandle};
use crate::value::CacheValue;

/// Redis cache client with connection pooling
///
/// Cheap to clone; clones share one pool. Construct it once at startup and
/// pass it to whatever needs cache access.
#[derive(Clone)]
pub struct CacheClient {
    handle: CacheHandle,
    config: CacheConfig,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("config", &self.config)
            .field("pool", &self.handle.status())
            .finish()
    }
}

impl CacheClient {
    /// Create a new cache client
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Pool`] if the pool cannot be built.
    pub fn new(config: CacheConfig) -> Result<Self> {
        tracing::info!(
            topology = %config.topology,
            pool_size = config.pool_size,
            auth = config.password.is_some(),
            "init redis"
        );

        let handle = CacheHandle::build(&config)?;
        Ok(Self { handle, config })
    }

    /// Create a client from `REDIS_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] when the environment is incomplete or
    /// malformed, and [`CacheError::Pool`] if the pool cannot be built.
    pub fn from_env() -> Result<Self> {
        let config = CacheConfig::from_env()
            .inspect_err(|e| tracing::error!(error = %e, "invalid redis configuration"))?;
        Self::new(config)
    }

    /// Shared pool handle for advanced operations
    #[must_use]
    pub const fn handle(&self) -> &CacheHandle {
        &self.handle
    }

    /// Configuration the client was built from
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Check out a raw pooled connection for commands not wrapped here
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if no connection is available.
    pub async fn connection(&self) -> Result<CacheConnection> {
        self.handle.get("connection").await
    }

    /// Round trip a `PING`
    ///
    /// # Errors
    ///
    /// Returns a connection or transport error.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.handle.get("PING").await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::transport("PING"))?;
        Ok(())
    }

    // =========================================================================
    // SCALAR OPERATIONS
    // =========================================================================

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidExpiry`] for a zero expiry (checked before any
    /// remote call), otherwise connection or transport errors.
    pub async fn set_value(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        expiry: Expiry,
    ) -> Result<()> {
        let value: CacheValue = value.into();
        let ttl = expiry.validate()?;

        let mut conn = self.handle.get("SET").await?;
        let _: () = expiry::set_cmd(key, value, ttl)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::transport("SET"))?;
        Ok(())
    }

    /// Raw bytes stored under `key`
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] if the key does not exist.
    pub async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let mut conn = self.handle.get("GET").await?;
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(CacheError::transport("GET"))?;

        value.ok_or_else(|| CacheError::NotFound {
            key: key.to_string(),
        })
    }

    /// Text stored under `key`
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] if the key does not exist,
    /// [`CacheError::Encoding`] if the value is not UTF-8.
    pub async fn get_string(&self, key: &str) -> Result<String> {
        let bytes = self.get_bytes(key).await?;
        String::from_utf8(bytes).map_err(|source| CacheError::Encoding {
            key: key.to_string(),
            source,
        })
    }

    /// Integer stored under `key`
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] if the key does not exist,
    /// [`CacheError::Parse`] if the value is not a base-10 `i64`.
    pub async fn get_int(&self, key: &str) -> Result<i64> {
        let text = self.get_string(key).await?;
        parse_int(key, &text)
    }

    /// Remaining time-to-live of `key`
    ///
    /// # Errors
    ///
    /// Connection or transport errors only; a missing key is [`Ttl::Missing`].
    pub async fn ttl(&self, key: &str) -> Result<Ttl> {
        let mut conn = self.handle.get("TTL").await?;
        let secs: i64 = conn
            .ttl(key)
            .await
            .map_err(CacheError::transport("TTL"))?;
        Ok(Ttl::from_reply(secs))
    }

    /// Delete `key`. Deleting a missing key is not an error.
    ///
    /// Returns whether a key was removed.
    ///
    /// # Errors
    ///
    /// Connection or transport errors.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.handle.get("DEL").await?;
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(CacheError::transport("DEL"))?;
        Ok(removed > 0)
    }

    // =========================================================================
    // JSON OPERATIONS
    // =========================================================================

    /// Serialize `value` as JSON and store it under `key`
    ///
    /// # Errors
    ///
    /// [`CacheError::Serialization`] plus the errors of [`Self::set_value`].
    pub async fn set_json<T>(&self, key: &str, value: &T, expiry: Expiry) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string(value)?;
        self.set_value(key, json, expiry).await
    }

    /// Read and deserialize the JSON stored under `key`
    ///
    /// # Errors
    ///
    /// [`CacheError::Serialization`] plus the errors of [`Self::get_string`].
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let json = self.get_string(key).await?;
        Ok(serde_json::from_str(&json)?)
    }

    // =========================================================================
    // LIST OPERATIONS
    // =========================================================================

    /// Replace the list at `key` with `elements`, then apply `expiry`.
    ///
    /// Elements are left-pushed in the given order, so reading the list back
    /// with [`Self::get_list`] yields them reversed: `["a", "b", "c"]` reads
    /// as `["c", "b", "a"]`. An empty `elements` just deletes the key.
    ///
    /// Against a standalone server the delete, push and expire run as one
    /// MULTI/EXEC transaction. Against a cluster they run one after another
    /// on the same connection; a failure after the first step leaves the
    /// earlier steps applied and is reported as
    /// [`CacheError::PartialFailure`].
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidExpiry`] for a zero expiry (checked before any
    /// remote call), otherwise connection, transport or partial-failure
    /// errors.
    pub async fn replace_list<S>(&self, key: &str, elements: &[S], expiry: Expiry) -> Result<()>
    where
        S: AsRef<str> + Sync,
    {
        let ttl = expiry.validate()?;
        let steps = list_rewrite(key, elements, ttl);

        let mut conn = self.handle.get("replace_list").await?;
        if self.handle.is_cluster() {
            run_in_sequence(&mut conn, key, &steps).await?;
        } else {
            let mut pipe = redis::pipe();
            pipe.atomic();
            for cmd in steps {
                pipe.add_command(cmd).ignore();
            }
            let _: () = pipe
                .query_async(&mut conn)
                .await
                .map_err(CacheError::transport("MULTI/EXEC"))?;
        }
        Ok(())
    }

    /// The whole list at `key`, in stored order. A missing key is empty.
    ///
    /// # Errors
    ///
    /// Connection or transport errors.
    pub async fn get_list(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.handle.get("LRANGE").await?;
        conn.lrange(key, 0, -1)
            .await
            .map_err(CacheError::transport("LRANGE"))
    }
}

/// `DEL`, then `LPUSH` (skipped when empty), then `EXPIRE` (when set).
fn list_rewrite<S: AsRef<str>>(
    key: &str,
    elements: &[S],
    ttl: Option<std::time::Duration>,
) -> Vec<Cmd> {
    let mut steps = Vec::with_capacity(3);

    let mut del = redis::cmd("DEL");
    del.arg(key);
    steps.push(del);

    if !elements.is_empty() {
        let mut push = redis::cmd("LPUSH");
        push.arg(key);
        for element in elements {
            push.arg(element.as_ref());
        }
        steps.push(push);
    }

    if let Some(ttl) = ttl {
        steps.push(expiry::expire_cmd(key, ttl));
    }

    steps
}

/// Run `steps` one by one. A failure on the first step (`DEL`) changed
/// nothing; a later one leaves the earlier steps applied.
async fn run_in_sequence(
    conn: &mut impl ConnectionLike,
    key: &str,
    steps: &[Cmd],
) -> Result<()> {
    let total = steps.len();
    for (applied, cmd) in steps.iter().enumerate() {
        let result: redis::RedisResult<()> = cmd.query_async(&mut *conn).await;
        result.map_err(|source| {
            if applied == 0 {
                CacheError::Transport { op: "DEL", source }
            } else {
                CacheError::PartialFailure {
                    key: key.to_string(),
                    applied,
                    total,
                    source,
                }
            }
        })?;
    }
    Ok(())
}

fn parse_int(key: &str, text: &str) -> Result<i64> {
    text.parse().map_err(|source| CacheError::Parse {
        key: key.to_string(),
        source,
    })
}
