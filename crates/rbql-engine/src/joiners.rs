//! Join strategies: produce the RHS record list for a left-side join key.

use rbql_core::error::{Error, Result};
use rbql_core::record::Record;
use rbql_core::value::Value;

use crate::query::JoinOperation;
use crate::traits::JoinMap;

/// Strategy for fetching right-hand-side records. `None` entries mean "no
/// RHS" so downstream still iterates the left row exactly once.
pub enum Joiner<'m> {
    /// No FROM JOIN: one synthetic empty RHS per left record.
    Void,
    Inner(&'m dyn JoinMap),
    Left(&'m dyn JoinMap),
    StrictLeft(&'m dyn JoinMap),
}

impl<'m> Joiner<'m> {
    pub fn new(operation: JoinOperation, join_map: Option<&'m dyn JoinMap>) -> Result<Self> {
        match (operation, join_map) {
            (JoinOperation::Void, None) => Ok(Joiner::Void),
            (JoinOperation::Void, Some(_)) => Err(Error::Parsing(
                "join table is not needed for this query".to_string(),
            )),
            (_, None) => Err(Error::Parsing(
                "query uses JOIN but no join table was provided".to_string(),
            )),
            (JoinOperation::Inner, Some(map)) => Ok(Joiner::Inner(map)),
            (JoinOperation::Left, Some(map)) => Ok(Joiner::Left(map)),
            (JoinOperation::StrictLeft, Some(map)) => Ok(Joiner::StrictLeft(map)),
        }
    }

    pub fn get_rhs(&self, left_key: &Value) -> Result<Vec<Option<Record>>> {
        match self {
            Joiner::Void => Ok(vec![None]),
            Joiner::Inner(map) => {
                let records = map.get_join_records(left_key)?;
                Ok(records.into_iter().map(Some).collect())
            }
            Joiner::Left(map) => {
                let records = map.get_join_records(left_key)?;
                if records.is_empty() {
                    // One null-filled RHS of the join table's full width.
                    Ok(vec![Some(vec![Value::Null; map.max_record_len()])])
                } else {
                    Ok(records.into_iter().map(Some).collect())
                }
            }
            Joiner::StrictLeft(map) => {
                let records = map.get_join_records(left_key)?;
                if records.len() != 1 {
                    return Err(Error::Runtime(format!(
                        "In 'STRICT LEFT JOIN' each key in A must have exactly one match in B. Bad A key: '{}'",
                        left_key
                    )));
                }
                Ok(records.into_iter().map(Some).collect())
            }
        }
    }
}
