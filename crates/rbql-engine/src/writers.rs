//! Composable output writers.
//!
//! Each stage implements `write` (false = downstream saturated, stop the
//! pipeline) and `finish` (flush, then cascade to the wrapped stage). Stages
//! compose by ownership: `TopWriter` always wraps the terminal adapter so
//! LIMIT counts rows actually produced, which for aggregate queries means
//! post-aggregation rows.

use std::collections::{BTreeSet, HashMap, HashSet};

use rbql_core::error::{Error, Result};
use rbql_core::key::{hash_record_key, Hash256};
use rbql_core::record::Record;
use rbql_core::value::{cmp_keys, Value};

use crate::aggregators::{Aggregator, ConstGroupVerifier};
use crate::eval::{RowValue, AGG_MISUSE_MSG};
use crate::traits::OutputWriter;

pub trait RecordWriter {
    fn write(&mut self, record: Record) -> Result<bool>;
    fn finish(&mut self) -> Result<()>;
}

/// Terminal chain element: forwards to the external output writer.
pub struct OutputAdapter<'o> {
    out: &'o mut dyn OutputWriter,
}

impl<'o> OutputAdapter<'o> {
    pub fn new(out: &'o mut dyn OutputWriter) -> Self {
        Self { out }
    }
}

impl RecordWriter for OutputAdapter<'_> {
    fn write(&mut self, record: Record) -> Result<bool> {
        self.out.write(record)
    }

    fn finish(&mut self) -> Result<()> {
        self.out.finish()
    }
}

/// LIMIT enforcement. Saturates once `top_count` records went through.
pub struct TopWriter<'o> {
    sub: Box<dyn RecordWriter + 'o>,
    top_count: Option<u64>,
    written: u64,
}

impl<'o> TopWriter<'o> {
    pub fn new(sub: Box<dyn RecordWriter + 'o>, top_count: Option<u64>) -> Self {
        Self {
            sub,
            top_count,
            written: 0,
        }
    }
}

impl RecordWriter for TopWriter<'_> {
    fn write(&mut self, record: Record) -> Result<bool> {
        if let Some(limit) = self.top_count {
            if self.written >= limit {
                return Ok(false);
            }
        }
        self.written += 1;
        self.sub.write(record)
    }

    fn finish(&mut self) -> Result<()> {
        self.sub.finish()
    }
}

/// DISTINCT: drops records whose canonical encoding was already seen.
pub struct UniqWriter<'o> {
    sub: Box<dyn RecordWriter + 'o>,
    seen: HashSet<Hash256>,
}

impl<'o> UniqWriter<'o> {
    pub fn new(sub: Box<dyn RecordWriter + 'o>) -> Self {
        Self {
            sub,
            seen: HashSet::new(),
        }
    }
}

impl RecordWriter for UniqWriter<'_> {
    fn write(&mut self, record: Record) -> Result<bool> {
        let key = hash_record_key(&record)?;
        if !self.seen.insert(key) {
            // Duplicate: drop silently, keep feeding.
            return Ok(true);
        }
        self.sub.write(record)
    }

    fn finish(&mut self) -> Result<()> {
        self.sub.finish()
    }
}

/// DISTINCT COUNT: tallies occurrences, emits `[count, ...record]` in
/// first-seen order on finish.
pub struct UniqCountWriter<'o> {
    sub: Box<dyn RecordWriter + 'o>,
    index: HashMap<Hash256, usize>,
    entries: Vec<(i64, Record)>,
}

impl<'o> UniqCountWriter<'o> {
    pub fn new(sub: Box<dyn RecordWriter + 'o>) -> Self {
        Self {
            sub,
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl RecordWriter for UniqCountWriter<'_> {
    fn write(&mut self, record: Record) -> Result<bool> {
        let key = hash_record_key(&record)?;
        match self.index.get(&key) {
            Some(&i) => self.entries[i].0 += 1,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((1, record));
            }
        }
        Ok(true)
    }

    fn finish(&mut self) -> Result<()> {
        for (count, mut record) in std::mem::take(&mut self.entries) {
            record.insert(0, Value::Int(count));
            if !self.sub.write(record)? {
                break;
            }
        }
        self.sub.finish()
    }
}

/// ORDER BY: buffers every row with its sort key, emits sorted on finish.
///
/// The driver appends the record number as the last key component, so the
/// stable elementwise comparison is a total order and `reverse` equals a
/// descending sort.
pub struct SortedWriter<'o> {
    sub: Box<dyn RecordWriter + 'o>,
    reverse: bool,
    entries: Vec<(Vec<Value>, Record)>,
}

impl<'o> SortedWriter<'o> {
    pub fn new(sub: Box<dyn RecordWriter + 'o>, reverse: bool) -> Self {
        Self {
            sub,
            reverse,
            entries: Vec::new(),
        }
    }

    pub fn write(&mut self, sort_key: Vec<Value>, record: Record) -> Result<bool> {
        self.entries.push((sort_key, record));
        Ok(true)
    }

    pub fn finish(&mut self) -> Result<()> {
        let mut entries = std::mem::take(&mut self.entries);
        entries.sort_by(|(a, _), (b, _)| cmp_keys(a, b));
        if self.reverse {
            entries.reverse();
        }
        for (_, record) in entries {
            if !self.sub.write(record)? {
                break;
            }
        }
        self.sub.finish()
    }
}

/// Aggregation terminal: owns one aggregator per output position and the
/// ordered set of group keys; emits one record per group on finish.
pub struct AggregateWriter<'o> {
    sub: Box<dyn RecordWriter + 'o>,
    aggregators: Vec<Box<dyn Aggregator>>,
    group_keys: BTreeSet<String>,
}

impl<'o> AggregateWriter<'o> {
    /// Build from the first aggregated row: token positions take their
    /// registered functional aggregator, every other position gets a
    /// constancy verifier. The token count must match the registrations --
    /// a mismatch means an aggregate call got consumed inside an expression.
    pub fn attach(
        sub: Box<dyn RecordWriter + 'o>,
        pending: &mut Vec<Option<Box<dyn Aggregator>>>,
        first_row: &[RowValue],
    ) -> Result<Self> {
        let token_count = first_row
            .iter()
            .filter(|v| matches!(v, RowValue::Aggregation(_)))
            .count();
        if token_count != pending.len() {
            return Err(Error::Parsing(AGG_MISUSE_MSG.to_string()));
        }
        let mut aggregators: Vec<Box<dyn Aggregator>> = Vec::with_capacity(first_row.len());
        for (pos, v) in first_row.iter().enumerate() {
            match v {
                RowValue::Aggregation(token) => {
                    let agg = pending
                        .get_mut(token.index)
                        .and_then(Option::take)
                        .ok_or_else(|| {
                            Error::Unexpected(
                                "aggregation token does not match a registered aggregator"
                                    .to_string(),
                            )
                        })?;
                    aggregators.push(agg);
                }
                RowValue::Plain(_) => aggregators.push(Box::new(ConstGroupVerifier::new(pos))),
                RowValue::UnnestMarker => {
                    return Err(Error::Parsing(
                        "UNNEST is not allowed in aggregate queries".to_string(),
                    ))
                }
            }
        }
        Ok(Self {
            sub,
            aggregators,
            group_keys: BTreeSet::new(),
        })
    }

    /// Fold one row's contributions into every positional aggregator.
    pub fn increment_all(&mut self, key: &str, contributions: &[Value]) -> Result<()> {
        if contributions.len() != self.aggregators.len() {
            return Err(Error::Unexpected(
                "inconsistent number of output columns in aggregate query".to_string(),
            ));
        }
        if !self.group_keys.contains(key) {
            self.group_keys.insert(key.to_string());
        }
        for (agg, value) in self.aggregators.iter_mut().zip(contributions) {
            agg.increment(key, value)?;
        }
        Ok(())
    }

    /// Emit one record per group, keys in lexicographic order.
    pub fn finish(&mut self) -> Result<()> {
        let keys: Vec<String> = self.group_keys.iter().cloned().collect();
        for key in &keys {
            let mut record = Record::with_capacity(self.aggregators.len());
            for agg in self.aggregators.iter_mut() {
                record.push(agg.get_final(key)?);
            }
            if !self.sub.write(record)? {
                break;
            }
        }
        self.sub.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect {
        records: Vec<Record>,
        finished: bool,
    }

    impl RecordWriter for &mut Collect {
        fn write(&mut self, record: Record) -> Result<bool> {
            self.records.push(record);
            Ok(true)
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn rec(values: &[i64]) -> Record {
        values.iter().map(|v| Value::Int(*v)).collect()
    }

    #[test]
    fn top_writer_saturates_at_limit() {
        let mut sink = Collect::default();
        {
            let mut top = TopWriter::new(Box::new(&mut sink), Some(2));
            assert!(top.write(rec(&[1])).unwrap());
            assert!(top.write(rec(&[2])).unwrap());
            assert!(!top.write(rec(&[3])).unwrap());
            top.finish().unwrap();
        }
        assert_eq!(sink.records, vec![rec(&[1]), rec(&[2])]);
        assert!(sink.finished);
    }

    #[test]
    fn uniq_writer_drops_duplicates_but_keeps_feeding() {
        let mut sink = Collect::default();
        {
            let mut uniq = UniqWriter::new(Box::new(&mut sink));
            assert!(uniq.write(rec(&[1])).unwrap());
            assert!(uniq.write(rec(&[1])).unwrap());
            assert!(uniq.write(rec(&[2])).unwrap());
            uniq.finish().unwrap();
        }
        assert_eq!(sink.records, vec![rec(&[1]), rec(&[2])]);
    }

    #[test]
    fn uniq_count_prefixes_counts_in_first_seen_order() {
        let mut sink = Collect::default();
        {
            let mut w = UniqCountWriter::new(Box::new(&mut sink));
            for v in [7, 9, 7, 7] {
                w.write(rec(&[v])).unwrap();
            }
            w.finish().unwrap();
        }
        assert_eq!(sink.records, vec![rec(&[3, 7]), rec(&[1, 9])]);
    }

    #[test]
    fn sorted_writer_is_stable_with_nr_tiebreak() {
        let mut sink = Collect::default();
        {
            let mut w = SortedWriter::new(Box::new(&mut sink), false);
            // Same leading key, NR tiebreaker preserves input order.
            w.write(vec![Value::Int(1), Value::Int(1)], rec(&[10])).unwrap();
            w.write(vec![Value::Int(0), Value::Int(2)], rec(&[20])).unwrap();
            w.write(vec![Value::Int(1), Value::Int(3)], rec(&[30])).unwrap();
            w.finish().unwrap();
        }
        assert_eq!(sink.records, vec![rec(&[20]), rec(&[10]), rec(&[30])]);
    }
}
