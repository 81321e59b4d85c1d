//! Per-row expression evaluation context.
//!
//! Compiled query expressions receive an [`EvalContext`] giving positional
//! field access over the composed left+RHS record, the `NR`/`NF` variables,
//! the aggregate entry points, and `UNNEST`. Aggregate calls return an
//! [`AggregationToken`] on the first aggregated row and the plain argument
//! afterwards; the two-stage scheme lets the driver detect aggregation
//! lazily from the first row that uses it.

use rbql_core::error::{Error, Result};
use rbql_core::record::{safe_get, safe_join_get};
use rbql_core::value::Value;

use crate::aggregators::{
    Aggregator, ArrayAggAggregator, AvgAggregator, CountAggregator, MaxAggregator,
    MedianAggregator, MinAggregator, SumAggregator, VarianceAggregator,
};

pub(crate) const AGG_MISUSE_MSG: &str =
    "Usage of aggregation functions inside expressions is not allowed, see the docs";

/// Sentinel produced by an aggregate call during row evaluation. Carries the
/// position of its registered aggregator and the value this row contributes
/// to the group.
#[derive(Debug, Clone)]
pub struct AggregationToken {
    pub index: usize,
    pub value: Value,
}

/// One element of an evaluated output row.
#[derive(Debug, Clone)]
pub enum RowValue {
    Plain(Value),
    Aggregation(AggregationToken),
    UnnestMarker,
}

impl RowValue {
    /// Unwrap to a plain value. Aggregation tokens refuse: aggregate results
    /// cannot be composed inside arithmetic or string expressions.
    pub fn into_plain(self) -> Result<Value> {
        match self {
            RowValue::Plain(v) => Ok(v),
            RowValue::Aggregation(_) => Err(Error::Parsing(AGG_MISUSE_MSG.to_string())),
            RowValue::UnnestMarker => Err(Error::Runtime(
                "UNNEST markers cannot be used inside expressions".to_string(),
            )),
        }
    }
}

impl<T: Into<Value>> From<T> for RowValue {
    fn from(v: T) -> Self {
        RowValue::Plain(v.into())
    }
}

/// Aggregation detection state shared across rows. Stage 0: no aggregation
/// observed; stage 1: the current row registered aggregators; stage 2: the
/// aggregators were attached to the writer, aggregate calls are identity.
#[derive(Default)]
pub(crate) struct AggRegistry {
    pub(crate) stage: u8,
    pub(crate) pending: Vec<Option<Box<dyn Aggregator>>>,
}

pub struct EvalContext<'s> {
    nr: u64,
    left_len: usize,
    star: &'s [Value],
    agg: &'s mut AggRegistry,
    unnest: &'s mut Option<Vec<Value>>,
    array_agg_separator: &'s str,
}

impl<'s> EvalContext<'s> {
    pub(crate) fn new(
        nr: u64,
        left_len: usize,
        star: &'s [Value],
        agg: &'s mut AggRegistry,
        unnest: &'s mut Option<Vec<Value>>,
        array_agg_separator: &'s str,
    ) -> Self {
        Self {
            nr,
            left_len,
            star,
            agg,
            unnest,
            array_agg_separator,
        }
    }

    /// 1-based count of input records received so far.
    pub fn nr(&self) -> u64 {
        self.nr
    }

    /// Number of fields in the current left record.
    pub fn nf(&self) -> usize {
        self.left_len
    }

    /// The composed left+RHS record.
    pub fn star(&self) -> &[Value] {
        self.star
    }

    /// Mandatory left-side field `a{idx1}` (1-based).
    pub fn a(&self, idx1: usize) -> Result<Value> {
        let idx = idx1.checked_sub(1).ok_or(Error::BadField(0))?;
        Ok(safe_join_get(&self.star[..self.left_len], idx)?.clone())
    }

    /// Optional left-side field `a{idx1}`; `None` when the record is narrower.
    pub fn a_opt(&self, idx1: usize) -> Option<Value> {
        let idx = idx1.checked_sub(1)?;
        safe_get(&self.star[..self.left_len], idx).cloned()
    }

    /// Mandatory right-side field `b{idx1}` (1-based).
    pub fn b(&self, idx1: usize) -> Result<Value> {
        let idx = idx1.checked_sub(1).ok_or(Error::BadField(0))?;
        Ok(safe_join_get(&self.star[self.left_len..], idx)?.clone())
    }

    /// Optional right-side field `b{idx1}`.
    pub fn b_opt(&self, idx1: usize) -> Option<Value> {
        let idx = idx1.checked_sub(1)?;
        safe_get(&self.star[self.left_len..], idx).cloned()
    }

    pub fn min(&mut self, value: impl Into<Value>) -> RowValue {
        self.register(value.into(), || Box::new(MinAggregator::default()))
    }

    pub fn max(&mut self, value: impl Into<Value>) -> RowValue {
        self.register(value.into(), || Box::new(MaxAggregator::default()))
    }

    pub fn sum(&mut self, value: impl Into<Value>) -> RowValue {
        self.register(value.into(), || Box::new(SumAggregator::default()))
    }

    pub fn avg(&mut self, value: impl Into<Value>) -> RowValue {
        self.register(value.into(), || Box::new(AvgAggregator::default()))
    }

    pub fn variance(&mut self, value: impl Into<Value>) -> RowValue {
        self.register(value.into(), || Box::new(VarianceAggregator::default()))
    }

    pub fn median(&mut self, value: impl Into<Value>) -> RowValue {
        self.register(value.into(), || Box::new(MedianAggregator::default()))
    }

    /// `COUNT(*)`: every row in the group counts, regardless of value.
    pub fn count(&mut self) -> RowValue {
        self.register(Value::Int(1), || Box::new(CountAggregator::default()))
    }

    /// `ARRAY_AGG` with the default post-processor (join with the configured
    /// separator).
    pub fn array_agg(&mut self, value: impl Into<Value>) -> RowValue {
        let sep = self.array_agg_separator.to_string();
        self.register(value.into(), move || {
            Box::new(ArrayAggAggregator::with_separator(sep))
        })
    }

    /// `ARRAY_AGG` with a custom post-processor applied to the collected
    /// group values on finalization.
    pub fn array_agg_with(
        &mut self,
        value: impl Into<Value>,
        post: impl Fn(&[Value]) -> Value + 'static,
    ) -> RowValue {
        self.register(value.into(), move || {
            Box::new(ArrayAggAggregator::with_post(Box::new(post)))
        })
    }

    /// `UNNEST(list)`: records the list for cartesian expansion and marks the
    /// output position. At most one call per row.
    pub fn unnest(&mut self, list: Vec<Value>) -> Result<RowValue> {
        if self.unnest.is_some() {
            return Err(Error::Parsing(
                "Only one UNNEST is allowed per query".to_string(),
            ));
        }
        *self.unnest = Some(list);
        Ok(RowValue::UnnestMarker)
    }

    fn register(
        &mut self,
        value: Value,
        make: impl FnOnce() -> Box<dyn Aggregator>,
    ) -> RowValue {
        if self.agg.stage < 2 {
            self.agg.stage = 1;
            let index = self.agg.pending.len();
            self.agg.pending.push(Some(make()));
            RowValue::Aggregation(AggregationToken { index, value })
        } else {
            RowValue::Plain(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_parts() -> (AggRegistry, Option<Vec<Value>>) {
        (AggRegistry::default(), None)
    }

    #[test]
    fn tokens_refuse_composition() {
        let (mut agg, mut unnest) = ctx_parts();
        let star = vec![Value::Int(3)];
        let mut ctx = EvalContext::new(1, 1, &star, &mut agg, &mut unnest, "|");
        let token = ctx.min(Value::Int(3));
        let err = token.into_plain().unwrap_err();
        assert!(matches!(err, Error::Parsing(_)));
    }

    #[test]
    fn aggregate_calls_are_identity_after_attachment() {
        let (mut agg, mut unnest) = ctx_parts();
        agg.stage = 2;
        let star = vec![Value::Int(3)];
        let mut ctx = EvalContext::new(2, 1, &star, &mut agg, &mut unnest, "|");
        let v = ctx.sum(Value::Int(3));
        assert!(matches!(v, RowValue::Plain(Value::Int(3))));
        assert!(agg.pending.is_empty());
    }

    #[test]
    fn second_unnest_in_one_row_fails() {
        let (mut agg, mut unnest) = ctx_parts();
        let star = vec![Value::Int(1)];
        let mut ctx = EvalContext::new(1, 1, &star, &mut agg, &mut unnest, "|");
        ctx.unnest(vec![Value::Int(1)]).unwrap();
        assert!(ctx.unnest(vec![Value::Int(2)]).is_err());
    }

    #[test]
    fn rhs_fields_index_past_left_record() {
        let (mut agg, mut unnest) = ctx_parts();
        let star = vec![Value::Int(1), Value::from("r1"), Value::from("r2")];
        let ctx = EvalContext::new(1, 1, &star, &mut agg, &mut unnest, "|");
        assert_eq!(ctx.a(1).unwrap(), Value::Int(1));
        assert_eq!(ctx.b(2).unwrap(), Value::from("r2"));
        assert!(ctx.a_opt(2).is_none());
        assert!(matches!(ctx.b(3), Err(Error::BadField(2))));
    }
}
