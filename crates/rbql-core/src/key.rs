//! Canonical key encoding and stable hashing.
//!
//! Grouping and uniqueness need a deterministic, total serialization of
//! dynamic values; canonical JSON gives one for every value the engine
//! carries. Uniqueness sets store a blake3 digest of the encoding instead of
//! the full string.

use blake3::Hasher;

use crate::error::{Error, Result};
use crate::value::Value;

/// Canonical JSON encoding of a single value (group keys).
pub fn canonical_key(value: &Value) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Unexpected(format!("canonical key encoding failed: {}", e)))
}

/// Canonical JSON encoding of a whole record (uniqueness keys).
pub fn canonical_record_key(record: &[Value]) -> Result<String> {
    serde_json::to_string(record)
        .map_err(|e| Error::Unexpected(format!("canonical record encoding failed: {}", e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash256(h.finalize().into())
}

pub fn hash_str(s: &str) -> Hash256 {
    hash_bytes(s.as_bytes())
}

/// Digest of a record's canonical encoding, for set membership.
pub fn hash_record_key(record: &[Value]) -> Result<Hash256> {
    Ok(hash_str(&canonical_record_key(record)?))
}
