//! In-memory implementations of the external interfaces.
//!
//! These back embedded use (query a `Vec<Record>` directly) and the test
//! suite; file-format iterators and writers live with the embedder.

use std::collections::HashMap;

use rbql_core::error::{Error, Result};
use rbql_core::key::canonical_key;
use rbql_core::record::Record;
use rbql_core::value::Value;

use crate::traits::{InputIterator, JoinMap, OutputWriter};

/// Pulls records from an owned table, tracking field-count consistency.
pub struct TableIterator {
    records: std::vec::IntoIter<Record>,
    nr: u64,
    stopped: bool,
    first_nf: Option<usize>,
    fields_info_warning: Option<String>,
}

impl TableIterator {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into_iter(),
            nr: 0,
            stopped: false,
            first_nf: None,
            fields_info_warning: None,
        }
    }
}

impl InputIterator for TableIterator {
    fn next_record(&mut self) -> Result<Option<Record>> {
        if self.stopped {
            return Ok(None);
        }
        let Some(record) = self.records.next() else {
            return Ok(None);
        };
        self.nr += 1;
        match self.first_nf {
            None => self.first_nf = Some(record.len()),
            Some(nf) if nf != record.len() && self.fields_info_warning.is_none() => {
                self.fields_info_warning = Some(format!(
                    "Number of fields in \"input\" table is not consistent: e.g. record 1 -> {} fields, record {} -> {} fields",
                    nf, self.nr, record.len()
                ));
            }
            _ => {}
        }
        Ok(Some(record))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn get_warnings(&self) -> Vec<String> {
        self.fields_info_warning.iter().cloned().collect()
    }
}

/// Collects output records into a table.
#[derive(Default)]
pub struct TableWriter {
    pub records: Vec<Record>,
    finished: bool,
}

impl TableWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl OutputWriter for TableWriter {
    fn write(&mut self, record: Record) -> Result<bool> {
        self.records.push(record);
        Ok(true)
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn get_warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Preloads a table into a `key -> records` map keyed on the canonical
/// encoding of one column.
pub struct HashJoinMap {
    table: Vec<Record>,
    key_column_1based: usize,
    map: HashMap<String, Vec<Record>>,
    max_record_len: usize,
    built: bool,
    fields_info_warning: Option<String>,
}

impl HashJoinMap {
    pub fn new(table: Vec<Record>, key_column_1based: usize) -> Self {
        Self {
            table,
            key_column_1based,
            map: HashMap::new(),
            max_record_len: 0,
            built: false,
            fields_info_warning: None,
        }
    }
}

impl JoinMap for HashJoinMap {
    fn build(&mut self) -> Result<()> {
        if self.built {
            return Err(Error::Unexpected("join map was already built".to_string()));
        }
        self.built = true;
        let table = std::mem::take(&mut self.table);
        let mut first_nf: Option<usize> = None;
        for (i, record) in table.into_iter().enumerate() {
            if self.key_column_1based == 0 || self.key_column_1based > record.len() {
                return Err(Error::Runtime(format!(
                    "Unable to use column {} as a join key: record {} in the join table has only {} fields",
                    self.key_column_1based,
                    i + 1,
                    record.len()
                )));
            }
            match first_nf {
                None => first_nf = Some(record.len()),
                Some(nf) if nf != record.len() && self.fields_info_warning.is_none() => {
                    self.fields_info_warning = Some(format!(
                        "Number of fields in \"join\" table is not consistent: e.g. record 1 -> {} fields, record {} -> {} fields",
                        nf,
                        i + 1,
                        record.len()
                    ));
                }
                _ => {}
            }
            let key = canonical_key(&record[self.key_column_1based - 1])?;
            self.max_record_len = self.max_record_len.max(record.len());
            self.map.entry(key).or_default().push(record);
        }
        Ok(())
    }

    fn get_join_records(&self, key: &Value) -> Result<Vec<Record>> {
        Ok(self
            .map
            .get(&canonical_key(key)?)
            .cloned()
            .unwrap_or_default())
    }

    fn max_record_len(&self) -> usize {
        self.max_record_len
    }

    fn get_warnings(&self) -> Vec<String> {
        self.fields_info_warning.iter().cloned().collect()
    }
}
