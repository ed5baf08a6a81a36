//! Expiration policy and TTL replies.

use std::time::Duration;

use redis::Cmd;

use crate::error::{CacheError, Result};

/// How long a written entry lives.
///
/// `Never` is the only way to ask for no expiration. A zero `After` is
/// rejected instead of being read as "expire now" or "keep forever".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    #[default]
    Never,
    After(Duration),
}

impl Expiry {
    /// Expire after a whole number of seconds
    #[must_use]
    pub const fn secs(secs: u64) -> Self {
        Self::After(Duration::from_secs(secs))
    }

    /// The duration to apply, `None` for `Never`.
    pub(crate) fn validate(self) -> Result<Option<Duration>> {
        match self {
            Self::Never => Ok(None),
            Self::After(d) if d.is_zero() => Err(CacheError::InvalidExpiry(d)),
            Self::After(d) => Ok(Some(d)),
        }
    }
}

impl From<Duration> for Expiry {
    fn from(d: Duration) -> Self {
        Self::After(d)
    }
}

impl From<Option<Duration>> for Expiry {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Self::Never, Self::After)
    }
}

/// Seconds when `d` is whole, milliseconds otherwise.
enum Precision {
    Seconds(u64),
    Millis(u64),
}

impl Precision {
    fn of(d: Duration) -> Self {
        if d.subsec_nanos() == 0 {
            Self::Seconds(d.as_secs())
        } else {
            Self::Millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1))
        }
    }
}

/// `SET key value [EX s | PX ms]`
pub(crate) fn set_cmd<V: redis::ToRedisArgs>(key: &str, value: V, ttl: Option<Duration>) -> Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    match ttl.map(Precision::of) {
        Some(Precision::Seconds(s)) => {
            cmd.arg("EX").arg(s);
        }
        Some(Precision::Millis(ms)) => {
            cmd.arg("PX").arg(ms);
        }
        None => {}
    }
    cmd
}

/// `EXPIRE key s` or `PEXPIRE key ms`
pub(crate) fn expire_cmd(key: &str, ttl: Duration) -> Cmd {
    match Precision::of(ttl) {
        Precision::Seconds(s) => {
            let mut cmd = redis::cmd("EXPIRE");
            cmd.arg(key).arg(s);
            cmd
        }
        Precision::Millis(ms) => {
            let mut cmd = redis::cmd("PEXPIRE");
            cmd.arg(key).arg(ms);
            cmd
        }
    }
}

/// Remaining time-to-live of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key expires after this long
    Expires(Duration),
    /// The key exists and has no expiration
    Persistent,
    /// The key does not exist
    Missing,
}

impl Ttl {
    /// Decode a `TTL` reply: -2 missing, -1 no expiry, seconds otherwise.
    #[must_use]
    pub fn from_reply(secs: i64) -> Self {
        match secs {
            -1 => Self::Persistent,
            s if s < 0 => Self::Missing,
            s => Self::Expires(Duration::from_secs(s.unsigned_abs())),
        }
    }

    /// Remaining duration, if the key expires
    #[must_use]
    pub const fn remaining(self) -> Option<Duration> {
        match self {
            Self::Expires(d) => Some(d),
            Self::Persistent | Self::Missing => None,
        }
    }
}
