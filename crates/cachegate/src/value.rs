//! Values accepted by [`CacheClient::set_value`](crate::CacheClient::set_value).

use redis::{RedisWrite, ToRedisArgs};

/// A scalar cache value: text, raw bytes or an integer.
///
/// Integers are stored in their base-10 text form, which is what
/// [`CacheClient::get_int`](crate::CacheClient::get_int) parses back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Text(String),
    Bytes(Vec<u8>),
    Int(i64),
}

impl ToRedisArgs for CacheValue {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            Self::Text(text) => text.write_redis_args(out),
            Self::Bytes(bytes) => bytes.write_redis_args(out),
            Self::Int(n) => n.write_redis_args(out),
        }
    }
}

impl From<String> for CacheValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for CacheValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for CacheValue {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<i64> for CacheValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for CacheValue {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(CacheValue::from("abc"), CacheValue::Text("abc".to_string()));
        assert_eq!(
            CacheValue::from(&b"\x00\xff"[..]),
            CacheValue::Bytes(vec![0, 255])
        );
        assert_eq!(CacheValue::from(-12_i32), CacheValue::Int(-12));
    }

    #[test]
    fn test_wire_form() {
        assert_eq!(CacheValue::Int(-42).to_redis_args(), vec![b"-42".to_vec()]);
        assert_eq!(
            CacheValue::Text("hello".into()).to_redis_args(),
            vec![b"hello".to_vec()]
        );
        assert_eq!(
            CacheValue::Bytes(vec![1, 2, 3]).to_redis_args(),
            vec![vec![1, 2, 3]]
        );
    }
}
