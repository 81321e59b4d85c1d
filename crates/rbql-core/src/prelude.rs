//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::error::{Error, ErrorKind, QueryError, Result};
pub use crate::key::{canonical_key, canonical_record_key, hash_record_key, Hash256};
pub use crate::record::{safe_get, safe_join_get, safe_set, Record};
pub use crate::value::{cmp_keys, cmp_values, parse_number, Value};
