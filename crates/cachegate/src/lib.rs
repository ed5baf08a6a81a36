//! # cachegate
//!
//! A thin, typed facade over a Redis cache, reachable either as a single
//! pooled endpoint or as a Redis Cluster.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │         Application          │
//! └──────────────────────────────┘
//!                │  CacheClient (cloned, passed explicitly)
//!                ▼
//! ┌──────────────────────────────┐
//! │  set_value / get_* / ttl /   │
//! │  delete / replace_list / ... │
//! └──────────────────────────────┘
//!                │  one pooled connection per operation
//!                ▼
//! ┌──────────────┐  ┌─────────────┐
//! │  standalone  │  │   cluster   │
//! │  pool        │  │   pool      │
//! └──────────────┘  └─────────────┘
//! ```
//!
//! Pooling, cluster routing and the wire protocol are handled by `redis` and
//! `deadpool-redis`; this crate only configures them and forwards calls.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cachegate::{CacheClient, Expiry};
//!
//! let cache = CacheClient::from_env()?;
//!
//! cache.set_value("session:42", "alice", Expiry::secs(300)).await?;
//! let user = cache.get_string("session:42").await?;
//!
//! cache.replace_list("recent", &["a", "b", "c"], Expiry::Never).await?;
//! assert_eq!(cache.get_list("recent").await?, ["c", "b", "a"]);
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod expiry;
pub mod handle;
pub mod value;

// Re-export commonly used types
pub use client::CacheClient;
pub use config::{CacheConfig, Endpoint, Topology};
pub use error::{CacheError, ConfigError, Result};
pub use expiry::{Expiry, Ttl};
pub use handle::{CacheConnection, CacheHandle, PoolStatus};
pub use value::CacheValue;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
