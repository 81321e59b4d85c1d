#![forbid(unsafe_code)]
//! RBQL: the record-processing core of an embedded SQL-like query engine.
//!
//! A pre-compiled query (per-record closures plus flags) runs against a
//! stream of records. SELECT and UPDATE are supported, with optional JOIN,
//! WHERE, aggregation, ORDER BY, DISTINCT, LIMIT, and UNNEST.
//!
//! This facade re-exports the data model from `rbql-core` and the pipeline
//! from `rbql-engine`.

pub use rbql_core::config::EngineConfig;
pub use rbql_core::error::{Error, ErrorKind, QueryError, Result};
pub use rbql_core::key::{canonical_key, canonical_record_key, hash_record_key, Hash256};
pub use rbql_core::record::{safe_get, safe_join_get, safe_set, Record};
pub use rbql_core::value::{cmp_keys, cmp_values, num_add, parse_number, to_f64, Value};
pub use rbql_core::VERSION;

pub use rbql_engine::engine::{QueryRunner, RunSummary};
pub use rbql_engine::eval::{AggregationToken, EvalContext, RowValue};
pub use rbql_engine::query::{CompiledQuery, JoinOperation, WriterKind};
pub use rbql_engine::tables::{HashJoinMap, TableIterator, TableWriter};
pub use rbql_engine::traits::{InputIterator, JoinMap, OutputWriter};
pub use rbql_engine::writers::RecordWriter;
