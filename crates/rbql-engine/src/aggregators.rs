//! Per-group aggregation state.
//!
//! Each aggregator keeps a `group key -> partial state` map and supports
//! incremental update plus finalization. Median and ARRAY_AGG are the only
//! variants that buffer values; the rest keep O(1) state per group.

use std::collections::HashMap;

use rbql_core::error::{Error, Result};
use rbql_core::value::{cmp_values, num_add, parse_number, to_f64, Value};

/// Uniform contract: `increment` folds one row's contribution into the group,
/// `get_final` produces the output value for the group.
pub trait Aggregator {
    fn increment(&mut self, key: &str, value: &Value) -> Result<()>;
    fn get_final(&mut self, key: &str) -> Result<Value>;
}

fn missing_group(key: &str) -> Error {
    Error::Unexpected(format!("no aggregation state for group '{}'", key))
}

#[derive(Default)]
pub struct MinAggregator {
    stats: HashMap<String, Value>,
}

impl Aggregator for MinAggregator {
    fn increment(&mut self, key: &str, value: &Value) -> Result<()> {
        let value = parse_number(value)?;
        match self.stats.get_mut(key) {
            Some(cur) => {
                if cmp_values(&value, cur) == std::cmp::Ordering::Less {
                    *cur = value;
                }
            }
            None => {
                self.stats.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    fn get_final(&mut self, key: &str) -> Result<Value> {
        self.stats.get(key).cloned().ok_or_else(|| missing_group(key))
    }
}

#[derive(Default)]
pub struct MaxAggregator {
    stats: HashMap<String, Value>,
}

impl Aggregator for MaxAggregator {
    fn increment(&mut self, key: &str, value: &Value) -> Result<()> {
        let value = parse_number(value)?;
        match self.stats.get_mut(key) {
            Some(cur) => {
                if cmp_values(&value, cur) == std::cmp::Ordering::Greater {
                    *cur = value;
                }
            }
            None => {
                self.stats.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    fn get_final(&mut self, key: &str) -> Result<Value> {
        self.stats.get(key).cloned().ok_or_else(|| missing_group(key))
    }
}

/// Sums stay integral until a float contributes.
#[derive(Default)]
pub struct SumAggregator {
    stats: HashMap<String, Value>,
}

impl Aggregator for SumAggregator {
    fn increment(&mut self, key: &str, value: &Value) -> Result<()> {
        let value = parse_number(value)?;
        match self.stats.get_mut(key) {
            Some(cur) => *cur = num_add(cur, &value)?,
            None => {
                self.stats.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    fn get_final(&mut self, key: &str) -> Result<Value> {
        self.stats.get(key).cloned().ok_or_else(|| missing_group(key))
    }
}

#[derive(Default)]
pub struct AvgAggregator {
    stats: HashMap<String, (f64, u64)>,
}

impl Aggregator for AvgAggregator {
    fn increment(&mut self, key: &str, value: &Value) -> Result<()> {
        let x = to_f64(value)?;
        let entry = self.stats.entry(key.to_string()).or_insert((0.0, 0));
        entry.0 += x;
        entry.1 += 1;
        Ok(())
    }

    fn get_final(&mut self, key: &str) -> Result<Value> {
        let (sum, count) = self.stats.get(key).ok_or_else(|| missing_group(key))?;
        Ok(Value::Float(sum / *count as f64))
    }
}

/// Population variance: `E[x^2] - (E[x])^2`.
#[derive(Default)]
pub struct VarianceAggregator {
    stats: HashMap<String, (f64, f64, u64)>,
}

impl Aggregator for VarianceAggregator {
    fn increment(&mut self, key: &str, value: &Value) -> Result<()> {
        let x = to_f64(value)?;
        let entry = self.stats.entry(key.to_string()).or_insert((0.0, 0.0, 0));
        entry.0 += x;
        entry.1 += x * x;
        entry.2 += 1;
        Ok(())
    }

    fn get_final(&mut self, key: &str) -> Result<Value> {
        let (sum, sum_sq, count) = self.stats.get(key).ok_or_else(|| missing_group(key))?;
        let n = *count as f64;
        let mean = sum / n;
        Ok(Value::Float(sum_sq / n - mean * mean))
    }
}

/// Buffers group values; sorts on finalize. Even-sized groups yield the mean
/// of the two middle elements.
#[derive(Default)]
pub struct MedianAggregator {
    stats: HashMap<String, Vec<Value>>,
}

impl Aggregator for MedianAggregator {
    fn increment(&mut self, key: &str, value: &Value) -> Result<()> {
        let value = parse_number(value)?;
        self.stats.entry(key.to_string()).or_default().push(value);
        Ok(())
    }

    fn get_final(&mut self, key: &str) -> Result<Value> {
        let values = self.stats.get_mut(key).ok_or_else(|| missing_group(key))?;
        values.sort_by(cmp_values);
        let n = values.len();
        if n % 2 == 1 {
            Ok(values[n / 2].clone())
        } else {
            let lo = to_f64(&values[n / 2 - 1])?;
            let hi = to_f64(&values[n / 2])?;
            Ok(Value::Float((lo + hi) / 2.0))
        }
    }
}

#[derive(Default)]
pub struct CountAggregator {
    stats: HashMap<String, i64>,
}

impl Aggregator for CountAggregator {
    fn increment(&mut self, key: &str, _value: &Value) -> Result<()> {
        *self.stats.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn get_final(&mut self, key: &str) -> Result<Value> {
        self.stats
            .get(key)
            .map(|n| Value::Int(*n))
            .ok_or_else(|| missing_group(key))
    }
}

pub type PostProcessor = Box<dyn Fn(&[Value]) -> Value>;

/// Collects raw group values; finalization applies a post-processor.
pub struct ArrayAggAggregator {
    stats: HashMap<String, Vec<Value>>,
    post: PostProcessor,
}

impl ArrayAggAggregator {
    /// Default post-processor: join the text forms with `separator`.
    pub fn with_separator(separator: String) -> Self {
        Self::with_post(Box::new(move |values| {
            let parts: Vec<String> = values.iter().map(|v| v.to_text()).collect();
            Value::Str(parts.join(&separator))
        }))
    }

    pub fn with_post(post: PostProcessor) -> Self {
        Self {
            stats: HashMap::new(),
            post,
        }
    }
}

impl Aggregator for ArrayAggAggregator {
    fn increment(&mut self, key: &str, value: &Value) -> Result<()> {
        self.stats
            .entry(key.to_string())
            .or_default()
            .push(value.clone());
        Ok(())
    }

    fn get_final(&mut self, key: &str) -> Result<Value> {
        let values = self.stats.get(key).ok_or_else(|| missing_group(key))?;
        Ok((self.post)(values))
    }
}

/// Stand-in for non-aggregated output columns of an aggregate query: every
/// row in a group must produce the same value.
pub struct ConstGroupVerifier {
    out_column: usize,
    stats: HashMap<String, Value>,
}

impl ConstGroupVerifier {
    pub fn new(out_column: usize) -> Self {
        Self {
            out_column,
            stats: HashMap::new(),
        }
    }
}

impl Aggregator for ConstGroupVerifier {
    fn increment(&mut self, key: &str, value: &Value) -> Result<()> {
        match self.stats.get(key) {
            Some(prev) => {
                if prev != value {
                    return Err(Error::Parsing(format!(
                        "Invalid aggregate expression: non-constant values in output column number {}. E.g. \"{}\" and \"{}\"",
                        self.out_column + 1,
                        prev,
                        value
                    )));
                }
            }
            None => {
                self.stats.insert(key.to_string(), value.clone());
            }
        }
        Ok(())
    }

    fn get_final(&mut self, key: &str) -> Result<Value> {
        self.stats.get(key).cloned().ok_or_else(|| missing_group(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_keeps_ints_until_float() {
        let mut agg = SumAggregator::default();
        agg.increment("g", &Value::from("2")).unwrap();
        agg.increment("g", &Value::Int(3)).unwrap();
        assert_eq!(agg.get_final("g").unwrap(), Value::Int(5));
        agg.increment("g", &Value::Float(0.5)).unwrap();
        assert_eq!(agg.get_final("g").unwrap(), Value::Float(5.5));
    }

    #[test]
    fn variance_is_population_variance() {
        let mut agg = VarianceAggregator::default();
        for v in [2, 4, 4, 4, 5, 5, 7, 9] {
            agg.increment("g", &Value::Int(v)).unwrap();
        }
        match agg.get_final("g").unwrap() {
            Value::Float(x) => assert!((x - 4.0).abs() < 1e-9),
            other => panic!("expected float variance, got {:?}", other),
        }
    }

    #[test]
    fn median_even_and_odd() {
        let mut agg = MedianAggregator::default();
        for v in [5, 1, 3] {
            agg.increment("g", &Value::Int(v)).unwrap();
        }
        assert_eq!(agg.get_final("g").unwrap(), Value::Int(3));
        agg.increment("g", &Value::Int(7)).unwrap();
        assert_eq!(agg.get_final("g").unwrap(), Value::Float(4.0));
    }

    #[test]
    fn count_ignores_values() {
        let mut agg = CountAggregator::default();
        agg.increment("g", &Value::Null).unwrap();
        agg.increment("g", &Value::from("x")).unwrap();
        assert_eq!(agg.get_final("g").unwrap(), Value::Int(2));
    }

    #[test]
    fn array_agg_default_join() {
        let mut agg = ArrayAggAggregator::with_separator("|".to_string());
        agg.increment("g", &Value::from("a")).unwrap();
        agg.increment("g", &Value::Int(2)).unwrap();
        assert_eq!(agg.get_final("g").unwrap(), Value::from("a|2"));
    }

    #[test]
    fn const_group_verifier_names_output_column() {
        let mut agg = ConstGroupVerifier::new(2);
        agg.increment("g", &Value::from("a")).unwrap();
        let err = agg.increment("g", &Value::from("b")).unwrap_err();
        match err {
            Error::Parsing(msg) => {
                assert!(msg.contains("output column number 3"));
                assert!(msg.contains("\"a\"") && msg.contains("\"b\""));
            }
            other => panic!("expected parsing error, got {:?}", other),
        }
    }
}
