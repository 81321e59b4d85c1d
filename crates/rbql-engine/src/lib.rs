#![forbid(unsafe_code)]
//! rbql-engine: the record-processing pipeline of the RBQL query engine.
//!
//! A pre-compiled query (closures injected by a host-side query compiler)
//! runs against a stream of records pulled from an [`traits::InputIterator`].
//! Each record flows through an optional joiner, the row processor, and a
//! composable writer chain ending in the external [`traits::OutputWriter`].
//!
//! Design intent:
//! - Single-threaded push pipeline; one `QueryRunner` handles exactly one
//!   query and refuses re-use.
//! - Writers compose by ownership-wrapping; saturation propagates upstream as
//!   a `false` return from `write`.
//! - Errors are classified once, terminally; success and error finalization
//!   are mutually exclusive.

pub mod aggregators;
pub mod engine;
pub mod eval;
pub mod joiners;
pub mod query;
pub mod tables;
pub mod traits;
pub mod writers;

pub use engine::{QueryRunner, RunSummary};
pub use eval::{AggregationToken, EvalContext, RowValue};
pub use query::{CompiledQuery, JoinOperation, WriterKind};
pub use tables::{HashJoinMap, TableIterator, TableWriter};
pub use traits::{InputIterator, JoinMap, OutputWriter};
pub use writers::RecordWriter;
