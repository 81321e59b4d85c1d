//! Dynamic field values.
//!
//! Input records carry opaque dynamic values; the engine only interprets them
//! where an operation demands it (numeric aggregation coerces via
//! [`parse_number`], sorting uses [`cmp_values`], grouping and uniqueness use
//! the canonical JSON encoding from the `key` module).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single field value. `List` backs `ARRAY_AGG` results and `UNNEST` inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form used for output serialization and `ARRAY_AGG` joining.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

/// Coerce a value to a number.
///
/// Strings parse as `i64` first, then `f64`. Everything non-numeric is a
/// runtime error, matching the coercion rule of the numeric aggregators.
pub fn parse_number(value: &Value) -> Result<Value> {
    match value {
        Value::Int(_) | Value::Float(_) => Ok(value.clone()),
        Value::Str(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::Int(i));
            }
            if let Ok(x) = trimmed.parse::<f64>() {
                return Ok(Value::Float(x));
            }
            Err(Error::Runtime(format!(
                "Unable to convert value \"{}\" to int or float",
                s
            )))
        }
        other => Err(Error::Runtime(format!(
            "Unable to convert value \"{}\" to int or float",
            other
        ))),
    }
}

/// Numeric view of a value, for mean/variance math.
pub fn to_f64(value: &Value) -> Result<f64> {
    match parse_number(value)? {
        Value::Int(i) => Ok(i as f64),
        Value::Float(x) => Ok(x),
        _ => unreachable!("parse_number returns Int or Float"),
    }
}

/// Add two already-numeric values. Integer sums stay integers until a float
/// contributes.
pub fn num_add(a: &Value, b: &Value) -> Result<Value> {
    match (parse_number(a)?, parse_number(b)?) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x + y)),
        (x, y) => Ok(Value::Float(as_f64_unchecked(&x) + as_f64_unchecked(&y))),
    }
}

fn as_f64_unchecked(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(x) => *x,
        _ => f64::NAN,
    }
}

/// Rank used for cross-type comparisons: values of different types order by
/// a fixed type rank, numerics excepted (they share the number line).
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Str(_) => 3,
        Value::List(_) => 4,
    }
}

/// Total order over values.
///
/// Nulls sort first; `Int`/`Float` compare on the number line; NaN sorts after
/// every other float; mixed types fall back to the type rank.
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    use Value::*;
    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Bool(x), Bool(y)) => x.cmp(y),
        (Int(x), Int(y)) => x.cmp(y),
        (Int(x), Float(y)) => cmp_f64(*x as f64, *y),
        (Float(x), Int(y)) => cmp_f64(*x, *y as f64),
        (Float(x), Float(y)) => cmp_f64(*x, *y),
        (Str(x), Str(y)) => x.cmp(y),
        (List(x), List(y)) => cmp_keys(x, y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn cmp_f64(x: f64, y: f64) -> Ordering {
    if x.is_nan() && y.is_nan() {
        Ordering::Equal
    } else if x.is_nan() {
        Ordering::Greater
    } else if y.is_nan() {
        Ordering::Less
    } else {
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
}

/// Lexicographic elementwise comparison of sort keys.
///
/// A key that is a prefix of another compares by length. The engine always
/// appends the record number as the last component, so equal-prefix keys are
/// broken deterministically and the sort stays stable.
pub fn cmp_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match cmp_values(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}
