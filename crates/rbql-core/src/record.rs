//! Records and safe positional field access.
//!
//! The three access forms mirror the three reference styles of a query:
//! optional access for unknown-width inputs returns `None`, mandatory access
//! raises `BadField`, and UPDATE assignment targets a 1-based column.

use crate::error::{Error, Result};
use crate::value::Value;

/// An ordered sequence of field values.
pub type Record = Vec<Value>;

/// Optional field access: `None` when `idx` is out of bounds.
pub fn safe_get(record: &[Value], idx: usize) -> Option<&Value> {
    record.get(idx)
}

/// Mandatory field access: `BadField(idx)` when out of bounds.
pub fn safe_join_get(record: &[Value], idx: usize) -> Result<&Value> {
    record.get(idx).ok_or(Error::BadField(idx))
}

/// UPDATE assignment target. `idx_1based` counts from 1; out-of-range raises
/// `BadField(idx_1based - 1)`.
pub fn safe_set(record: &mut [Value], idx_1based: usize, value: Value) -> Result<()> {
    if idx_1based >= 1 && idx_1based <= record.len() {
        record[idx_1based - 1] = value;
        Ok(())
    } else {
        Err(Error::BadField(idx_1based.saturating_sub(1)))
    }
}
