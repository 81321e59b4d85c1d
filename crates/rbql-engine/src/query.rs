//! The code-generation contract between the query compiler and this core.
//!
//! A host-side compiler lowers an RBQL query into per-record closures plus a
//! handful of flags; [`CompiledQuery`] is that bundle. The engine never sees
//! query text.

use rbql_core::error::Result;
use rbql_core::record::Record;
use rbql_core::value::Value;

use crate::eval::{EvalContext, RowValue};

pub type BoolExpr = Box<dyn Fn(&mut EvalContext<'_>) -> Result<bool>>;
pub type ValueExpr = Box<dyn Fn(&mut EvalContext<'_>) -> Result<Value>>;
pub type SelectExpr = Box<dyn Fn(&mut EvalContext<'_>) -> Result<Vec<RowValue>>>;
pub type UpdateExpr = Box<dyn Fn(&mut EvalContext<'_>, &mut Record) -> Result<()>>;
pub type SortKeyExpr = Box<dyn Fn(&mut EvalContext<'_>) -> Result<Vec<Value>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterKind {
    #[default]
    Simple,
    Uniq,
    UniqCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinOperation {
    #[default]
    Void,
    /// `JOIN` and `INNER JOIN`.
    Inner,
    Left,
    StrictLeft,
}

/// A single pre-compiled query. Exactly one of `select_expr` / `update_expr`
/// must be set.
#[derive(Default)]
pub struct CompiledQuery {
    pub select_expr: Option<SelectExpr>,
    pub update_expr: Option<UpdateExpr>,
    pub where_expr: Option<BoolExpr>,
    pub aggregation_key_expr: Option<ValueExpr>,
    pub sort_key_expr: Option<SortKeyExpr>,
    /// Extracts the left-side join key (the `lhs_join_var`).
    pub join_key_expr: Option<ValueExpr>,
    pub reverse_sort: bool,
    pub top_count: Option<u64>,
    pub writer_kind: WriterKind,
    pub join_operation: JoinOperation,
}

impl CompiledQuery {
    pub fn select(expr: impl Fn(&mut EvalContext<'_>) -> Result<Vec<RowValue>> + 'static) -> Self {
        Self {
            select_expr: Some(Box::new(expr)),
            ..Self::default()
        }
    }

    pub fn update(
        expr: impl Fn(&mut EvalContext<'_>, &mut Record) -> Result<()> + 'static,
    ) -> Self {
        Self {
            update_expr: Some(Box::new(expr)),
            ..Self::default()
        }
    }

    pub fn with_where(mut self, expr: impl Fn(&mut EvalContext<'_>) -> Result<bool> + 'static) -> Self {
        self.where_expr = Some(Box::new(expr));
        self
    }

    pub fn with_group_by(
        mut self,
        expr: impl Fn(&mut EvalContext<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.aggregation_key_expr = Some(Box::new(expr));
        self
    }

    pub fn with_order_by(
        mut self,
        expr: impl Fn(&mut EvalContext<'_>) -> Result<Vec<Value>> + 'static,
        reverse: bool,
    ) -> Self {
        self.sort_key_expr = Some(Box::new(expr));
        self.reverse_sort = reverse;
        self
    }

    pub fn with_limit(mut self, top_count: u64) -> Self {
        self.top_count = Some(top_count);
        self
    }

    pub fn with_distinct(mut self) -> Self {
        self.writer_kind = WriterKind::Uniq;
        self
    }

    pub fn with_distinct_count(mut self) -> Self {
        self.writer_kind = WriterKind::UniqCount;
        self
    }

    pub fn with_join(
        mut self,
        operation: JoinOperation,
        key_expr: impl Fn(&mut EvalContext<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.join_operation = operation;
        self.join_key_expr = Some(Box::new(key_expr));
        self
    }
}
