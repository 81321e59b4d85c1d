//! Record driver: pulls input records through the joiner, the row processor,
//! and the writer chain, and classifies every failure into exactly one
//! terminal `(kind, message)` outcome.

use tracing::{debug, trace};

use rbql_core::config::EngineConfig;
use rbql_core::error::{Error, ErrorKind, QueryError, Result};
use rbql_core::key::canonical_key;
use rbql_core::record::Record;
use rbql_core::value::Value;

use crate::eval::{AggRegistry, EvalContext, RowValue};
use crate::joiners::Joiner;
use crate::query::{CompiledQuery, JoinOperation, WriterKind};
use crate::traits::{InputIterator, JoinMap, OutputWriter};
use crate::writers::{
    AggregateWriter, OutputAdapter, RecordWriter, SortedWriter, TopWriter, UniqCountWriter,
    UniqWriter,
};

const NOT_IN_AGGREGATE_MSG: &str =
    "\"ORDER BY\", \"UPDATE\" and \"DISTINCT\" keywords are not allowed in aggregate queries";

/// Canonical group key of the single default group.
const DEFAULT_GROUP_KEY: &str = "null";

/// Success outcome of a query run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Join, writer, and input warnings, in that order.
    pub warnings: Vec<String>,
    /// NR: input records received.
    pub records_read: u64,
    /// NU: records modified by an UPDATE query.
    pub records_updated: u64,
}

/// Executes a single pre-compiled query. One runner handles exactly one
/// query; a second `run` fails immediately.
pub struct QueryRunner {
    query: CompiledQuery,
    cfg: EngineConfig,
    used: bool,
}

impl QueryRunner {
    pub fn new(query: CompiledQuery) -> Self {
        Self::with_config(query, EngineConfig::default())
    }

    pub fn with_config(query: CompiledQuery, cfg: EngineConfig) -> Self {
        Self {
            query,
            cfg,
            used: false,
        }
    }

    /// Run the query to completion. Exactly one of the success summary or the
    /// classified error is produced, exactly once.
    pub fn run(
        &mut self,
        input: &mut dyn InputIterator,
        join_map: Option<&mut dyn JoinMap>,
        output: &mut dyn OutputWriter,
    ) -> std::result::Result<RunSummary, QueryError> {
        if self.used {
            return Err(QueryError::new(
                ErrorKind::Unexpected,
                "Module can only be used once",
            ));
        }
        self.used = true;

        let query = &self.query;
        let debug_mode = self.cfg.debug;

        validate(query, join_map.is_some()).map_err(|e| classify_startup(e, debug_mode))?;

        let join_map: Option<&dyn JoinMap> = match join_map {
            Some(map) => {
                map.build().map_err(|e| classify_startup(e, debug_mode))?;
                debug!(max_record_len = map.max_record_len(), "join map built");
                Some(&*map)
            }
            None => None,
        };
        let joiner =
            Joiner::new(query.join_operation, join_map).map_err(|e| classify_startup(e, debug_mode))?;

        debug!(
            is_select = query.select_expr.is_some(),
            writer_kind = ?query.writer_kind,
            join_operation = ?query.join_operation,
            top_count = ?query.top_count,
            "starting query"
        );

        let (records_read, records_updated) = {
            let mut st = ExecState::new(query, &self.cfg, output);
            if let Err(e) = drive(query, &mut st, &joiner, input) {
                let nr = st.nr;
                if debug_mode {
                    debug!(error = %e, nr, "query terminated with error");
                }
                return Err(classify_record_error(e, nr));
            }
            if let Err(e) = st.finish() {
                let nr = st.nr;
                if debug_mode {
                    debug!(error = %e, nr, "finalization failed");
                }
                return Err(classify_record_error(e, nr));
            }
            (st.nr, st.nu)
        };

        let mut warnings = Vec::new();
        if let Some(map) = join_map {
            warnings.extend(map.get_warnings());
        }
        warnings.extend(output.get_warnings());
        warnings.extend(input.get_warnings());

        debug!(records_read, records_updated, "query finished");
        Ok(RunSummary {
            warnings,
            records_read,
            records_updated,
        })
    }
}

fn validate(query: &CompiledQuery, has_join_map: bool) -> Result<()> {
    match (query.select_expr.is_some(), query.update_expr.is_some()) {
        (true, false) | (false, true) => {}
        _ => {
            return Err(Error::Unexpected(
                "exactly one of the SELECT and UPDATE expressions must be provided".to_string(),
            ))
        }
    }
    if query.update_expr.is_some()
        && (query.sort_key_expr.is_some() || query.writer_kind != WriterKind::Simple)
    {
        return Err(Error::Parsing(
            "\"ORDER BY\" and \"DISTINCT\" are not allowed in \"UPDATE\" queries".to_string(),
        ));
    }
    if query.join_operation != JoinOperation::Void {
        if !has_join_map {
            return Err(Error::Parsing(
                "query uses JOIN but no join table was provided".to_string(),
            ));
        }
        if query.join_key_expr.is_none() {
            return Err(Error::Unexpected(
                "join key expression missing for JOIN query".to_string(),
            ));
        }
    }
    Ok(())
}

/// Pull records until the input drains, the pipeline saturates, or an error
/// terminates the query.
fn drive(
    query: &CompiledQuery,
    st: &mut ExecState<'_>,
    joiner: &Joiner<'_>,
    input: &mut dyn InputIterator,
) -> Result<()> {
    loop {
        let record = match input.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                st.finished_with_error = true;
                input.stop();
                return Err(e);
            }
        };
        match process_record(query, st, joiner, record) {
            Ok(true) => {}
            Ok(false) => {
                debug!(nr = st.nr, "output saturated, stopping input");
                input.stop();
                break;
            }
            Err(e) => {
                st.finished_with_error = true;
                input.stop();
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Process one input record. Returns `false` when a writer signaled stop.
/// Silent no-op once the query already terminated with an error.
fn process_record(
    query: &CompiledQuery,
    st: &mut ExecState<'_>,
    joiner: &Joiner<'_>,
    record: Record,
) -> Result<bool> {
    if st.finished_with_error {
        return Ok(true);
    }
    st.nr += 1;
    trace!(nr = st.nr, nf = record.len(), "processing record");

    let left_key = match joiner {
        Joiner::Void => Value::Null,
        _ => {
            let key_expr = query
                .join_key_expr
                .as_ref()
                .ok_or_else(|| Error::Unexpected("join key expression missing".to_string()))?;
            let mut ctx = st.eval_ctx(&record, record.len());
            key_expr(&mut ctx)?
        }
    };
    let rhs_records = joiner.get_rhs(&left_key)?;

    if query.select_expr.is_some() {
        process_select(query, st, &record, rhs_records)
    } else {
        process_update(query, st, record, rhs_records)
    }
}

fn process_select(
    query: &CompiledQuery,
    st: &mut ExecState<'_>,
    left: &Record,
    rhs_records: Vec<Option<Record>>,
) -> Result<bool> {
    let select = query
        .select_expr
        .as_ref()
        .ok_or_else(|| Error::Unexpected("select expression missing".to_string()))?;
    let left_len = left.len();

    for rhs in rhs_records {
        st.unnest = None;
        let star: Vec<Value> = match rhs {
            Some(rhs_record) => {
                let mut s = left.clone();
                s.extend(rhs_record);
                s
            }
            None => left.clone(),
        };

        if let Some(where_expr) = &query.where_expr {
            let mut ctx = st.eval_ctx(&star, left_len);
            if !where_expr(&mut ctx)? {
                continue;
            }
        }

        let group_key = match &query.aggregation_key_expr {
            Some(key_expr) => {
                let key_value = {
                    let mut ctx = st.eval_ctx(&star, left_len);
                    key_expr(&mut ctx)?
                };
                Some(canonical_key(&key_value)?)
            }
            None => None,
        };

        let out_fields = {
            let mut ctx = st.eval_ctx(&star, left_len);
            select(&mut ctx)?
        };

        if st.agg.stage >= 1 {
            let key = group_key.unwrap_or_else(|| DEFAULT_GROUP_KEY.to_string());
            select_aggregated(st, &key, out_fields)?;
        } else if st.unnest.is_some() {
            let sort_key = eval_sort_key(query, st, &star, left_len)?;
            if !select_unnested(st, sort_key, out_fields)? {
                return Ok(false);
            }
        } else {
            let fields: Record = out_fields
                .into_iter()
                .map(RowValue::into_plain)
                .collect::<Result<_>>()?;
            let sort_key = eval_sort_key(query, st, &star, left_len)?;
            if !st.write_row(sort_key, fields)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn process_update(
    query: &CompiledQuery,
    st: &mut ExecState<'_>,
    left: Record,
    rhs_records: Vec<Option<Record>>,
) -> Result<bool> {
    let update = query
        .update_expr
        .as_ref()
        .ok_or_else(|| Error::Unexpected("update expression missing".to_string()))?;
    if rhs_records.len() > 1 {
        return Err(Error::Runtime(
            "More than one record in UPDATE query matched A-key in join table B".to_string(),
        ));
    }
    let left_len = left.len();
    let mut up_fields = left.clone();

    if let Some(rhs) = rhs_records.into_iter().next() {
        let star: Vec<Value> = match rhs {
            Some(rhs_record) => {
                let mut s = left;
                s.extend(rhs_record);
                s
            }
            None => left,
        };
        let keep = match &query.where_expr {
            Some(where_expr) => {
                let mut ctx = st.eval_ctx(&star, left_len);
                where_expr(&mut ctx)?
            }
            None => true,
        };
        if keep {
            st.nu += 1;
            let mut ctx = st.eval_ctx(&star, left_len);
            update(&mut ctx, &mut up_fields)?;
        }
    }

    if st.agg.stage != 0 {
        return Err(Error::Parsing(NOT_IN_AGGREGATE_MSG.to_string()));
    }
    // Modified or not, the record is always emitted.
    st.write_row(None, up_fields)
}

fn select_aggregated(st: &mut ExecState<'_>, key: &str, out_fields: Vec<RowValue>) -> Result<()> {
    if st.agg.stage == 1 {
        if !st.plain_top {
            return Err(Error::Parsing(NOT_IN_AGGREGATE_MSG.to_string()));
        }
        let prev = match std::mem::replace(&mut st.writer, WriterChain::Detached) {
            WriterChain::Records(w) => w,
            other => {
                st.writer = other;
                return Err(Error::Parsing(NOT_IN_AGGREGATE_MSG.to_string()));
            }
        };
        let agg_writer = AggregateWriter::attach(prev, &mut st.agg.pending, &out_fields)?;
        st.writer = WriterChain::Aggregate(agg_writer);
        st.agg.stage = 2;
        debug!("aggregation detected, writer chain rebuilt");
    }

    let contributions: Vec<Value> = out_fields
        .into_iter()
        .map(|v| match v {
            RowValue::Plain(value) => Ok(value),
            RowValue::Aggregation(token) => Ok(token.value),
            RowValue::UnnestMarker => Err(Error::Parsing(
                "UNNEST is not allowed in aggregate queries".to_string(),
            )),
        })
        .collect::<Result<_>>()?;

    match &mut st.writer {
        WriterChain::Aggregate(w) => w.increment_all(key, &contributions),
        _ => Err(Error::Unexpected(
            "aggregation state without aggregate writer".to_string(),
        )),
    }
}

fn select_unnested(
    st: &mut ExecState<'_>,
    sort_key: Option<Vec<Value>>,
    out_fields: Vec<RowValue>,
) -> Result<bool> {
    let marker_pos = out_fields
        .iter()
        .position(|v| matches!(v, RowValue::UnnestMarker))
        .ok_or_else(|| Error::Unexpected("unnest list without marker in output row".to_string()))?;
    let mut base: Record = out_fields
        .into_iter()
        .map(|v| match v {
            RowValue::UnnestMarker => Ok(Value::Null),
            other => other.into_plain(),
        })
        .collect::<Result<_>>()?;
    let list = st
        .unnest
        .take()
        .ok_or_else(|| Error::Unexpected("unnest marker without a recorded list".to_string()))?;
    for item in list {
        base[marker_pos] = item;
        if !st.write_row(sort_key.clone(), base.clone())? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_sort_key(
    query: &CompiledQuery,
    st: &mut ExecState<'_>,
    star: &[Value],
    left_len: usize,
) -> Result<Option<Vec<Value>>> {
    match &query.sort_key_expr {
        Some(key_expr) => {
            let mut key = {
                let mut ctx = st.eval_ctx(star, left_len);
                key_expr(&mut ctx)?
            };
            // NR tiebreaker guarantees a stable total order.
            key.push(Value::Int(st.nr as i64));
            Ok(Some(key))
        }
        None => Ok(None),
    }
}

enum WriterChain<'o> {
    Records(Box<dyn RecordWriter + 'o>),
    Sorted(SortedWriter<'o>),
    Aggregate(AggregateWriter<'o>),
    Detached,
}

/// Per-run mutable state: counters, aggregation registry, the UNNEST slot,
/// and the writer chain.
struct ExecState<'o> {
    nr: u64,
    nu: u64,
    agg: AggRegistry,
    unnest: Option<Vec<Value>>,
    writer: WriterChain<'o>,
    /// True when the chain is a bare Top stack over the sink, the only shape
    /// aggregation may replace.
    plain_top: bool,
    finished_with_error: bool,
    array_agg_separator: String,
}

impl<'o> ExecState<'o> {
    fn new(query: &CompiledQuery, cfg: &EngineConfig, output: &'o mut dyn OutputWriter) -> Self {
        let mut chain: Box<dyn RecordWriter + 'o> = Box::new(OutputAdapter::new(output));
        chain = Box::new(TopWriter::new(chain, query.top_count));
        chain = match query.writer_kind {
            WriterKind::Simple => chain,
            WriterKind::Uniq => Box::new(UniqWriter::new(chain)),
            WriterKind::UniqCount => Box::new(UniqCountWriter::new(chain)),
        };
        let plain_top = query.writer_kind == WriterKind::Simple
            && query.sort_key_expr.is_none()
            && query.select_expr.is_some();
        let writer = if query.sort_key_expr.is_some() {
            WriterChain::Sorted(SortedWriter::new(chain, query.reverse_sort))
        } else {
            WriterChain::Records(chain)
        };
        Self {
            nr: 0,
            nu: 0,
            agg: AggRegistry::default(),
            unnest: None,
            writer,
            plain_top,
            finished_with_error: false,
            array_agg_separator: cfg.array_agg_separator.clone(),
        }
    }

    fn eval_ctx<'s>(&'s mut self, star: &'s [Value], left_len: usize) -> EvalContext<'s> {
        EvalContext::new(
            self.nr,
            left_len,
            star,
            &mut self.agg,
            &mut self.unnest,
            &self.array_agg_separator,
        )
    }

    fn write_row(&mut self, sort_key: Option<Vec<Value>>, record: Record) -> Result<bool> {
        match &mut self.writer {
            WriterChain::Records(w) => w.write(record),
            WriterChain::Sorted(w) => {
                let key = sort_key.ok_or_else(|| {
                    Error::Unexpected("sorting writer without a sort key".to_string())
                })?;
                w.write(key, record)
            }
            WriterChain::Aggregate(_) | WriterChain::Detached => Err(Error::Unexpected(
                "writer chain is not accepting plain records".to_string(),
            )),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.writer, WriterChain::Detached) {
            WriterChain::Records(mut w) => w.finish(),
            WriterChain::Sorted(mut w) => w.finish(),
            WriterChain::Aggregate(mut w) => w.finish(),
            WriterChain::Detached => Err(Error::Unexpected(
                "writer chain already finished".to_string(),
            )),
        }
    }
}

/// Map a record-processing failure to its terminal classified form.
fn classify_record_error(err: Error, nr: u64) -> QueryError {
    match err {
        Error::Parsing(msg) => QueryError::new(ErrorKind::QueryParsing, msg),
        Error::Runtime(msg) => QueryError::new(ErrorKind::QueryExecution, msg),
        Error::BadField(idx) => QueryError::new(
            ErrorKind::QueryExecution,
            format!("No 'a{}' column at record: {}", idx + 1, nr),
        ),
        Error::Unexpected(msg) => QueryError::new(
            ErrorKind::QueryExecution,
            format!("At record: {}, Details: {}", nr, msg),
        ),
    }
}

/// Classification for failures before the first record (validation, join-map
/// build).
fn classify_startup(err: Error, debug_mode: bool) -> QueryError {
    if debug_mode {
        debug!(error = %err, "query failed before processing records");
    }
    match err {
        Error::Parsing(msg) => QueryError::new(ErrorKind::QueryParsing, msg),
        Error::Runtime(msg) => QueryError::new(ErrorKind::QueryExecution, msg),
        Error::BadField(idx) => QueryError::new(
            ErrorKind::QueryExecution,
            format!("No 'a{}' column in the join table", idx + 1),
        ),
        Error::Unexpected(msg) => QueryError::new(ErrorKind::Unexpected, msg),
    }
}
