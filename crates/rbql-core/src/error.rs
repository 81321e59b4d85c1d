use std::fmt;

use thiserror::Error;

/// Canonical result for core and engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Internal error taxonomy. The record driver classifies these into a
/// [`QueryError`] with the record number of the failing record.
#[derive(Debug, Error)]
pub enum Error {
    /// Query misuse detectable only at evaluation time: aggregate calls inside
    /// expressions, multiple UNNEST, DISTINCT/ORDER BY combined with
    /// aggregation.
    #[error("{0}")]
    Parsing(String),

    /// Per-record evaluation failures: numeric coercion, strict-join
    /// violations, multi-match UPDATE.
    #[error("{0}")]
    Runtime(String),

    /// Access to a missing field. Carries the 0-based field index; the driver
    /// renders the user-facing 1-based column name.
    #[error("field index {0} is out of range")]
    BadField(usize),

    /// Anything outside the taxonomy.
    #[error("{0}")]
    Unexpected(String),
}

/// Public error class names of the engine contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    QueryParsing,
    QueryExecution,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::QueryParsing => "query parsing",
            ErrorKind::QueryExecution => "query execution",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal, classified form handed to the embedder. Exactly one of success
/// or one `QueryError` is produced per query run.
#[derive(Debug, Clone)]
pub struct QueryError {
    pub kind: ErrorKind,
    pub message: String,
}

impl QueryError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for QueryError {}
