//! Typed values exchanged with the proxy.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A single typed value as carried by the offload protocol.
///
/// The set of variants mirrors the protocol's data types one to one, so a
/// value decoded from the wire re-encodes to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedData {
    Null,
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    String(String),
    Binary(Vec<u8>),
}

impl TypedData {
    /// Borrow the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedData::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a boolean.
    ///
    /// Integers are accepted too since proxy sample fetches such as
    /// `ssl_fc` may be declared either way.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedData::Bool(b) => Some(*b),
            TypedData::Int32(v) => Some(*v != 0),
            TypedData::Uint32(v) => Some(*v != 0),
            TypedData::Int64(v) => Some(*v != 0),
            TypedData::Uint64(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Borrow the raw bytes of a string or binary value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TypedData::String(s) => Some(s.as_bytes()),
            TypedData::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Name of the protocol data type, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedData::Null => "null",
            TypedData::Bool(_) => "bool",
            TypedData::Int32(_) => "int32",
            TypedData::Uint32(_) => "uint32",
            TypedData::Int64(_) => "int64",
            TypedData::Uint64(_) => "uint64",
            TypedData::Ipv4(_) => "ipv4",
            TypedData::Ipv6(_) => "ipv6",
            TypedData::String(_) => "string",
            TypedData::Binary(_) => "binary",
        }
    }
}

impl fmt::Display for TypedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedData::Null => write!(f, "null"),
            TypedData::Bool(v) => write!(f, "{}", v),
            TypedData::Int32(v) => write!(f, "{}", v),
            TypedData::Uint32(v) => write!(f, "{}", v),
            TypedData::Int64(v) => write!(f, "{}", v),
            TypedData::Uint64(v) => write!(f, "{}", v),
            TypedData::Ipv4(v) => write!(f, "{}", v),
            TypedData::Ipv6(v) => write!(f, "{}", v),
            TypedData::String(v) => write!(f, "{:?}", v),
            TypedData::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<bool> for TypedData {
    fn from(v: bool) -> Self {
        TypedData::Bool(v)
    }
}

impl From<String> for TypedData {
    fn from(v: String) -> Self {
        TypedData::String(v)
    }
}

impl From<&str> for TypedData {
    fn from(v: &str) -> Self {
        TypedData::String(v.to_string())
    }
}

impl From<u32> for TypedData {
    fn from(v: u32) -> Self {
        TypedData::Uint32(v)
    }
}

impl From<i64> for TypedData {
    fn from(v: i64) -> Self {
        TypedData::Int64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_bool_accepts_integers() {
        assert_eq!(TypedData::Bool(true).as_bool(), Some(true));
        assert_eq!(TypedData::Int32(0).as_bool(), Some(false));
        assert_eq!(TypedData::Uint64(7).as_bool(), Some(true));
        assert_eq!(TypedData::String("true".into()).as_bool(), None);
    }

    #[test]
    fn test_as_bytes() {
        assert_eq!(TypedData::from("ab").as_bytes(), Some(&b"ab"[..]));
        assert_eq!(TypedData::Binary(vec![1, 2]).as_bytes(), Some(&[1u8, 2][..]));
        assert_eq!(TypedData::Null.as_bytes(), None);
    }

    #[test]
    fn test_display_hides_binary_content() {
        assert_eq!(TypedData::Binary(vec![0; 4]).to_string(), "<4 bytes>");
        assert_eq!(TypedData::from("x").to_string(), "\"x\"");
    }
}
