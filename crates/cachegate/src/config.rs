//! # Cache Configuration
//!
//! Environment-based configuration for the cache facade.
//!
//! | Variable | Meaning |
//! |---|---|
//! | `REDIS_SERVER` | comma-separated cluster nodes, selects the cluster topology |
//! | `REDIS_HOST` | standalone host, selects the standalone topology |
//! | `REDIS_PORT` | standalone port (default 6379) |
//! | `REDIS_PASSWORD` | AUTH password (optional) |
//! | `REDIS_POOL_SIZE` | max pooled connections (default: available parallelism) |
//! | `REDIS_POOL_TIMEOUT_SECS` | max wait for a pooled connection (default: none) |
//!
//! Cluster nodes are `host`, `host:port`, `[v6]:port` or `redis://` URLs. A
//! password embedded in a node URL is used for every node and must agree
//! with `REDIS_PASSWORD` when both are given.

use std::env;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use deadpool_redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use redis::IntoConnectionInfo;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 6379;
const DEFAULT_HOST: &str = "127.0.0.1";

/// Remote deployment shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// One Redis endpoint behind a connection pool
    Standalone { host: String, port: u16 },
    /// Redis Cluster, reachable through any listed node
    Cluster { nodes: Vec<Endpoint> },
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone { host, port } => write!(f, "standalone({host}:{port})"),
            Self::Cluster { nodes } => write!(f, "cluster({} nodes)", nodes.len()),
        }
    }
}

/// A validated `host:port` node address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = String;

    /// Parse `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 address.
    /// A missing port is 6379, an empty host is 127.0.0.1.
    fn from_str(node: &str) -> Result<Self, Self::Err> {
        let (host, port) = if let Some(rest) = node.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or("unterminated '['")?;
            if tail.is_empty() {
                (host, None)
            } else {
                (host, Some(tail.strip_prefix(':').ok_or("expected ':' after ']'")?))
            }
        } else {
            match node.split_once(':') {
                // More than one colon: a bare IPv6 address
                Some((_, rest)) if rest.contains(':') => (node, None),
                Some((host, port)) => (host, Some(port)),
                None => (node, None),
            }
        };

        let port = match port {
            Some(raw) => match raw.parse::<u16>() {
                Ok(0) => return Err("port must be non-zero".to_string()),
                Ok(port) => port,
                Err(e) => return Err(format!("invalid port {raw:?}: {e}")),
            },
            None => DEFAULT_PORT,
        };
        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        Ok(Self::new(host, port))
    }
}

/// Redis cache configuration
#[derive(Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub topology: Topology,
    pub password: Option<String>,
    pub pool_size: usize,
    pub pool_timeout: Option<Duration>,
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("topology", &self.topology)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("pool_size", &self.pool_size)
            .field("pool_timeout", &self.pool_timeout)
            .finish()
    }
}

impl CacheConfig {
    /// Config for a single Redis endpoint
    pub fn standalone(host: impl Into<String>, port: u16) -> Self {
        Self::with_topology(Topology::Standalone {
            host: host.into(),
            port,
        })
    }

    /// Config for a Redis Cluster
    pub fn cluster(nodes: impl IntoIterator<Item = Endpoint>) -> Self {
        Self::with_topology(Topology::Cluster {
            nodes: nodes.into_iter().collect(),
        })
    }

    fn with_topology(topology: Topology) -> Self {
        Self {
            topology,
            password: None,
            pool_size: default_pool_size(),
            pool_timeout: None,
        }
    }

    /// Set the AUTH password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the maximum number of pooled connections
    #[must_use]
    pub const fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Bound how long an operation waits for a pooled connection
    #[must_use]
    pub const fn with_pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = Some(timeout);
        self
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Fails when no topology variable is set, when both are set, when a
    /// numeric variable or node address does not parse, or when node URLs
    /// carry a password that disagrees with `REDIS_PASSWORD`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// See [`CacheConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let (topology, embedded_password) = match (var("REDIS_SERVER"), var("REDIS_HOST")) {
            (Some(_), Some(_)) => return Err(ConfigError::Ambiguous),
            (None, None) => return Err(ConfigError::Missing),
            (Some(servers), None) => {
                let (nodes, password) = parse_cluster(&servers)?;
                (Topology::Cluster { nodes }, password)
            }
            (None, Some(host)) => {
                let port = match var("REDIS_PORT") {
                    Some(raw) => parse_var("REDIS_PORT", &raw)?,
                    None => {
                        tracing::warn!(port = DEFAULT_PORT, "REDIS_PORT not set, using default");
                        DEFAULT_PORT
                    }
                };
                let topology = Topology::Standalone {
                    host: host.trim().to_string(),
                    port,
                };
                (topology, None)
            }
        };

        let password = match (var("REDIS_PASSWORD"), embedded_password) {
            (Some(env), Some(embedded)) if env != embedded => {
                return Err(ConfigError::Invalid {
                    name: "REDIS_PASSWORD",
                    value: "***".to_string(),
                    reason: "differs from the password in the REDIS_SERVER URLs".to_string(),
                });
            }
            (env, embedded) => env.or(embedded),
        };
        if password.is_none() {
            tracing::info!("REDIS_PASSWORD not set, connecting without AUTH");
        }

        let pool_size = match var("REDIS_POOL_SIZE") {
            Some(raw) => {
                let size: usize = parse_var("REDIS_POOL_SIZE", &raw)?;
                if size == 0 {
                    return Err(ConfigError::Invalid {
                        name: "REDIS_POOL_SIZE",
                        value: raw,
                        reason: "must be greater than zero".to_string(),
                    });
                }
                size
            }
            None => default_pool_size(),
        };

        let pool_timeout = var("REDIS_POOL_TIMEOUT_SECS")
            .map(|raw| parse_var("REDIS_POOL_TIMEOUT_SECS", &raw).map(Duration::from_secs))
            .transpose()?;

        Ok(Self {
            topology,
            password,
            pool_size,
            pool_timeout,
        })
    }

    /// Connection settings for every configured node, password included.
    #[must_use]
    pub fn connection_infos(&self) -> Vec<ConnectionInfo> {
        let redis = RedisConnectionInfo {
            password: self.password.clone(),
            ..RedisConnectionInfo::default()
        };
        let info = |host: &str, port: u16| ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_string(), port),
            redis: redis.clone(),
        };

        match &self.topology {
            Topology::Standalone { host, port } => vec![info(host, *port)],
            Topology::Cluster { nodes } => nodes
                .iter()
                .map(|node| info(&node.host, node.port))
                .collect(),
        }
    }
}

/// Pool size used when none is configured
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Parse `REDIS_SERVER` into node endpoints plus the password the node URLs
/// agree on, if any.
fn parse_cluster(servers: &str) -> Result<(Vec<Endpoint>, Option<String>), ConfigError> {
    let invalid = |value: &str, reason: String| ConfigError::Invalid {
        name: "REDIS_SERVER",
        value: redact_userinfo(value),
        reason,
    };

    let mut nodes = Vec::new();
    let mut password: Option<String> = None;
    for node in servers.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let (endpoint, embedded) = parse_node(node).map_err(|reason| invalid(node, reason))?;
        if let Some(embedded) = embedded {
            if password.as_ref().is_some_and(|seen| *seen != embedded) {
                return Err(invalid(node, "nodes carry different passwords".to_string()));
            }
            password.get_or_insert(embedded);
        }
        nodes.push(endpoint);
    }

    if nodes.is_empty() {
        return Err(invalid(servers, "no node addresses".to_string()));
    }
    Ok((nodes, password))
}

/// One cluster node, either `host[:port]` or a `redis://` URL.
fn parse_node(node: &str) -> Result<(Endpoint, Option<String>), String> {
    if !is_url(node) {
        return Ok((node.parse()?, None));
    }

    let info = node.into_connection_info().map_err(|e| e.to_string())?;
    if info.redis.username.is_some() {
        return Err("usernames are not supported".to_string());
    }
    if info.redis.db != 0 {
        return Err("cluster nodes have no database index".to_string());
    }
    match info.addr {
        redis::ConnectionAddr::Tcp(host, port) => {
            Ok((Endpoint::new(host, port), info.redis.password))
        }
        _ => Err("only plain TCP node addresses are supported".to_string()),
    }
}

fn is_url(node: &str) -> bool {
    node.contains("://")
}

/// Mask any `user:password@` part so it can go into an error message.
fn redact_userinfo(raw: &str) -> String {
    match (raw.find("://"), raw.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &raw[..scheme_end + 3], &raw[at..])
        }
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    fn addrs(config: &CacheConfig) -> Vec<String> {
        config
            .connection_infos()
            .iter()
            .map(|info| match &info.addr {
                ConnectionAddr::Tcp(host, port) => format!("{host}:{port}"),
                other => format!("{other:?}"),
            })
            .collect()
    }

    fn passwords(config: &CacheConfig) -> Vec<Option<String>> {
        config
            .connection_infos()
            .into_iter()
            .map(|info| info.redis.password)
            .collect()
    }

    #[test]
    fn test_standalone_from_env() {
        let config = CacheConfig::from_lookup(lookup(&[
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "s3cret"),
            ("REDIS_POOL_SIZE", "4"),
        ]))
        .unwrap();

        assert_eq!(
            config.topology,
            Topology::Standalone {
                host: "cache.internal".to_string(),
                port: 6380
            }
        );
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.pool_timeout, None);
        assert_eq!(addrs(&config), ["cache.internal:6380"]);
        assert_eq!(passwords(&config), [Some("s3cret".to_string())]);
    }

    #[test]
    fn test_standalone_default_port() {
        let config = CacheConfig::from_lookup(lookup(&[("REDIS_HOST", "localhost")])).unwrap();
        assert_eq!(addrs(&config), ["localhost:6379"]);
        assert_eq!(passwords(&config), [None]);
        assert_eq!(config.pool_size, default_pool_size());
    }

    #[test]
    fn test_cluster_from_env() {
        let config = CacheConfig::from_lookup(lookup(&[
            ("REDIS_SERVER", "10.0.0.1:7000, 10.0.0.2:7001,,:6379"),
            ("REDIS_POOL_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();

        assert_eq!(
            addrs(&config),
            ["10.0.0.1:7000", "10.0.0.2:7001", "127.0.0.1:6379"]
        );
        assert_eq!(config.pool_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_cluster_url_nodes_get_the_password() {
        let config = CacheConfig::from_lookup(lookup(&[
            ("REDIS_SERVER", "redis://10.0.0.1:7000,redis://10.0.0.2:7001"),
            ("REDIS_PASSWORD", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(addrs(&config), ["10.0.0.1:7000", "10.0.0.2:7001"]);
        let secret = Some("s3cret".to_string());
        assert_eq!(passwords(&config), [secret.clone(), secret]);
    }

    #[test]
    fn test_cluster_embedded_password_applies_to_every_node() {
        let config = CacheConfig::from_lookup(lookup(&[(
            "REDIS_SERVER",
            "redis://:p%40ss@node-a:7000,node-b",
        )]))
        .unwrap();

        assert_eq!(config.password.as_deref(), Some("p@ss"));
        assert_eq!(addrs(&config), ["node-a:7000", "node-b:6379"]);
        assert!(passwords(&config).iter().all(|p| p.as_deref() == Some("p@ss")));
    }

    #[test]
    fn test_conflicting_passwords_fail_closed() {
        let err = CacheConfig::from_lookup(lookup(&[
            ("REDIS_SERVER", "redis://:one@node-a:7000"),
            ("REDIS_PASSWORD", "two"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "REDIS_PASSWORD", .. }));
        assert!(!err.to_string().contains("two"));

        let err = CacheConfig::from_lookup(lookup(&[(
            "REDIS_SERVER",
            "redis://:one@node-a:7000,redis://:two@node-b:7001",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "REDIS_SERVER", .. }));
        assert!(!err.to_string().contains("two"));
    }

    #[test]
    fn test_missing_topology_fails_closed() {
        let err = CacheConfig::from_lookup(lookup(&[("REDIS_PASSWORD", "pw")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing));

        let err = CacheConfig::from_lookup(lookup(&[("REDIS_HOST", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing));
    }

    #[test]
    fn test_ambiguous_topology() {
        let err = CacheConfig::from_lookup(lookup(&[
            ("REDIS_SERVER", "a:1"),
            ("REDIS_HOST", "b"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Ambiguous));
    }

    #[test]
    fn test_invalid_numbers() {
        let err = CacheConfig::from_lookup(lookup(&[
            ("REDIS_HOST", "localhost"),
            ("REDIS_PORT", "sixty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "REDIS_PORT", .. }));

        let err = CacheConfig::from_lookup(lookup(&[
            ("REDIS_HOST", "localhost"),
            ("REDIS_POOL_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "REDIS_POOL_SIZE",
                ..
            }
        ));

        let err = CacheConfig::from_lookup(lookup(&[("REDIS_SERVER", " , ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "REDIS_SERVER", .. }));

        for bad in ["10.0.0.1:70x0", "10.0.0.1:", "node:0", "[::1", "[::1]7000"] {
            let err = CacheConfig::from_lookup(lookup(&[("REDIS_SERVER", bad)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { name: "REDIS_SERVER", .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_password_is_typed_and_redacted() {
        let config = CacheConfig::standalone("localhost", 6379).with_password("p@ss:w/rd");
        assert_eq!(passwords(&config), [Some("p@ss:w/rd".to_string())]);

        let debug = format!("{config:?}");
        assert!(!debug.contains("p@ss"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_endpoint_from_str() {
        let parse = |raw: &str| raw.parse::<Endpoint>().unwrap();
        assert_eq!(parse("host:7000"), Endpoint::new("host", 7000));
        assert_eq!(parse("host"), Endpoint::new("host", DEFAULT_PORT));
        assert_eq!(parse(":6379"), Endpoint::new(DEFAULT_HOST, 6379));
        assert_eq!(parse("[::1]:7000"), Endpoint::new("::1", 7000));
        assert_eq!(parse("[::1]"), Endpoint::new("::1", DEFAULT_PORT));
        assert_eq!(parse("fe80::1"), Endpoint::new("fe80::1", DEFAULT_PORT));
        assert_eq!(parse("[::1]:7000").to_string(), "[::1]:7000");
    }

    #[test]
    fn test_redact_userinfo() {
        assert_eq!(redact_userinfo("redis://:pw@host:1"), "redis://***@host:1");
        assert_eq!(redact_userinfo("host:1"), "host:1");
    }
}
