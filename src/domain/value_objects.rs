//! Value Objects - Immutable domain primitives
//!
//! Identifiers for networks, members and backing stores. They are compared
//! by value and can be freely copied between threads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Error returned when an identifier cannot be parsed from hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {value:?}")]
pub struct IdParseError {
    kind: &'static str,
    value: String,
}

/// 64-bit network identifier.
///
/// Formats as 16 lowercase hex digits, e.g. `8056c2e21c000001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

impl NetworkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for NetworkId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s, 16)
            .map(Self)
            .ok_or_else(|| IdParseError { kind: "network", value: s.to_string() })
    }
}

/// Member (node) identifier, scoped to a network.
///
/// Node addresses are 40 bits wide, so members format as 10 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub u64);

impl MemberId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010x}", self.0)
    }
}

impl FromStr for MemberId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s, 10)
            .map(Self)
            .ok_or_else(|| IdParseError { kind: "member", value: s.to_string() })
    }
}

fn parse_hex(s: &str, max_digits: usize) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || s.len() > max_digits {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a backing store instance.
///
/// Allocated from a process-wide counter, so two stores never share one.
/// Used to leave the originating store out of change propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_id_display_is_zero_padded() {
        assert_eq!(NetworkId::new(1).to_string(), "0000000000000001");
        assert_eq!(
            NetworkId::new(0x8056c2e21c000001).to_string(),
            "8056c2e21c000001"
        );
    }

    #[test]
    fn test_network_id_parse() {
        let id: NetworkId = "8056c2e21c000001".parse().unwrap();
        assert_eq!(id.as_u64(), 0x8056c2e21c000001);
        assert!("".parse::<NetworkId>().is_err());
        assert!("not-hex".parse::<NetworkId>().is_err());
        assert!("18056c2e21c000001".parse::<NetworkId>().is_err());
    }

    #[test]
    fn test_member_id_display_and_parse() {
        let id = MemberId::new(0xdeadbeef);
        assert_eq!(id.to_string(), "00deadbeef");
        assert_eq!("00deadbeef".parse::<MemberId>().unwrap(), id);
        assert_eq!("ffffffffff".parse::<MemberId>().unwrap(), MemberId(0xff_ffff_ffff));
        assert!("100deadbeef".parse::<MemberId>().is_err());
        assert!("8056c2e21c000001".parse::<MemberId>().is_err());
    }

    #[test]
    fn test_parse_error_message() {
        let err = "zz".parse::<MemberId>().unwrap_err();
        assert!(err.to_string().contains("member"));
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_store_ids_are_unique() {
        let a = StoreId::next();
        let b = StoreId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("store-"));
    }
}
