//! Canonical document identifiers.
//!
//! An [`ObjectId`] is 12 bytes rendered as a 24 character hexadecimal token:
//! a 4-byte big-endian unix timestamp followed by 8 random bytes. Any string
//! that is not exactly 24 hex digits is not an identifier.

use std::{fmt, str::FromStr};

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use uuid::Uuid;

use crate::EngineError;

const RAW_LEN: usize = 12;
const HEX_LEN: usize = RAW_LEN * 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; RAW_LEN]);

impl ObjectId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        let secs = Utc::now().timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        let random = Uuid::new_v4();

        let mut bytes = [0u8; RAW_LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..].copy_from_slice(&random.as_bytes()[..RAW_LEN - 4]);
        Self(bytes)
    }

    /// Seconds since the unix epoch encoded in the first four bytes.
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Syntactic parse: `Some` only for exactly 24 hex digits (either case).
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() != HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut bytes = [0u8; RAW_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&value[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for ObjectId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| EngineError::InvalidId(s.to_string()))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid object id: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_lowercase_hex() {
        let raw = "65a1f0c2b3d4e5f601234567";
        let id = ObjectId::parse(raw).unwrap();
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn parse_accepts_uppercase_and_renders_lowercase() {
        let id = ObjectId::parse("65A1F0C2B3D4E5F601234567").unwrap();
        assert_eq!(id.to_string(), "65a1f0c2b3d4e5f601234567");
    }

    #[test]
    fn parse_rejects_wrong_length_or_alphabet() {
        assert!(ObjectId::parse("").is_none());
        assert!(ObjectId::parse("65a1f0c2b3d4e5f60123456").is_none());
        assert!(ObjectId::parse("65a1f0c2b3d4e5f6012345678").is_none());
        assert!(ObjectId::parse("65a1f0c2b3d4e5f60123456z").is_none());
        assert!(ObjectId::parse("Groceries").is_none());
    }

    #[test]
    fn new_ids_are_distinct_and_carry_current_time() {
        let before = Utc::now().timestamp() as u32;
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert!(a.timestamp() >= before);
        assert_eq!(ObjectId::parse(&a.to_string()), Some(a));
    }
}
