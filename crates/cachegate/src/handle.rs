//! # Connection Handle
//!
//! The shared pool behind a [`CacheClient`](crate::CacheClient), for either
//! topology, and the pooled connection it hands out.

use deadpool_redis::{PoolConfig, Runtime};
use redis::aio::ConnectionLike;
use redis::{Cmd, Pipeline, RedisFuture, Value};

use crate::config::{CacheConfig, Topology};
use crate::error::{CacheError, Result};

/// Thread-safe connection pool for the configured topology.
///
/// Cloning is cheap: clones share the same pool.
#[derive(Clone)]
pub enum CacheHandle {
    Standalone(deadpool_redis::Pool),
    Cluster(deadpool_redis::cluster::Pool),
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    pub size: usize,
    pub available: usize,
}

impl CacheHandle {
    /// Build the pool. No connection is opened until the first checkout.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Pool`] when the pool cannot be created.
    pub fn build(config: &CacheConfig) -> Result<Self> {
        let mut pool = PoolConfig::new(config.pool_size);
        pool.timeouts.wait = config.pool_timeout;

        let mut nodes = config.connection_infos();
        match config.topology {
            Topology::Standalone { .. } => {
                let node = nodes.pop().ok_or_else(|| CacheError::Pool {
                    reason: "no endpoint configured".to_string(),
                })?;
                let mut cfg = deadpool_redis::Config::from_connection_info(node);
                cfg.pool = Some(pool);
                cfg.create_pool(Some(Runtime::Tokio1))
                    .map(Self::Standalone)
                    .map_err(|e| CacheError::Pool {
                        reason: e.to_string(),
                    })
            }
            Topology::Cluster { .. } => {
                let cfg = deadpool_redis::cluster::Config {
                    connections: Some(nodes),
                    pool: Some(pool),
                    ..deadpool_redis::cluster::Config::default()
                };
                cfg.create_pool(Some(Runtime::Tokio1))
                    .map(Self::Cluster)
                    .map_err(|e| CacheError::Pool {
                        reason: e.to_string(),
                    })
            }
        }
    }

    /// Check out one connection; it returns to the pool when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] tagged with `op` when no
    /// connection can be created or the wait timeout elapses.
    pub async fn get(&self, op: &'static str) -> Result<CacheConnection> {
        match self {
            Self::Standalone(pool) => pool
                .get()
                .await
                .map(CacheConnection::Standalone)
                .map_err(|e| CacheError::Connection {
                    op,
                    reason: e.to_string(),
                }),
            Self::Cluster(pool) => pool
                .get()
                .await
                .map(CacheConnection::Cluster)
                .map_err(|e| CacheError::Connection {
                    op,
                    reason: e.to_string(),
                }),
        }
    }

    /// Whether this handle talks to a Redis Cluster
    #[must_use]
    pub const fn is_cluster(&self) -> bool {
        matches!(self, Self::Cluster(_))
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let (max_size, size, available) = match self {
            Self::Standalone(pool) => {
                let s = pool.status();
                (s.max_size, s.size, s.available)
            }
            Self::Cluster(pool) => {
                let s = pool.status();
                (s.max_size, s.size, s.available)
            }
        };
        PoolStatus {
            max_size,
            size,
            available,
        }
    }
}

/// A pooled connection from either topology.
///
/// Implements [`ConnectionLike`], so `redis::AsyncCommands` can be used on it
/// directly for commands the facade does not wrap.
pub enum CacheConnection {
    Standalone(deadpool_redis::Connection),
    Cluster(deadpool_redis::cluster::Connection),
}

impl ConnectionLike for CacheConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Self::Standalone(conn) => conn.req_packed_command(cmd),
            Self::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Self::Standalone(conn) => conn.req_packed_commands(cmd, offset, count),
            Self::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Standalone(conn) => conn.get_db(),
            Self::Cluster(conn) => conn.get_db(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;

    #[tokio::test]
    async fn test_build_standalone_is_lazy() {
        let config = CacheConfig::standalone("127.0.0.1", 1).with_pool_size(3);
        let handle = CacheHandle::build(&config).unwrap();

        assert!(!handle.is_cluster());
        let status = handle.status();
        assert_eq!(status.max_size, 3);
        assert_eq!(status.size, 0);
    }

    #[tokio::test]
    async fn test_build_cluster_is_lazy() {
        let config = CacheConfig::cluster([
            Endpoint::new("127.0.0.1", 7000),
            Endpoint::new("127.0.0.1", 7001),
        ])
        .with_pool_size(2)
        .with_password("s3cret");
        let handle = CacheHandle::build(&config).unwrap();

        assert!(handle.is_cluster());
        assert_eq!(handle.status().max_size, 2);
    }

    #[tokio::test]
    async fn test_checkout_from_unreachable_endpoint() {
        let config = CacheConfig::standalone("127.0.0.1", 1).with_pool_size(1);
        let handle = CacheHandle::build(&config).unwrap();

        match handle.get("GET").await {
            Err(CacheError::Connection { op, .. }) => assert_eq!(op, "GET"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("port 1 should refuse connections"),
        }
    }
}
