//! Record source: delimited text to raw header-keyed records
//!
//! The source is lazy and single-pass. Every record is keyed by the header
//! row's column names in header order. Short rows yield `None` for the
//! missing trailing columns; fields beyond the header width are ignored.

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

/// One source row before any cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based position in the source, header excluded
    pub row_number: usize,
    /// Column name to value, in header order
    pub fields: Vec<(String, Option<String>)>,
}

impl RawRecord {
    pub fn new(row_number: usize, fields: Vec<(String, Option<String>)>) -> Self {
        Self { row_number, fields }
    }
}

/// Lazy iterator of [`RawRecord`] over pre-decoded text.
pub struct RecordSource<'a> {
    reader: csv::Reader<&'a [u8]>,
    columns: Vec<String>,
    /// header position -> index into `columns`
    slots: Vec<usize>,
    record: StringRecord,
    produced: usize,
}

impl<'a> RecordSource<'a> {
    pub fn from_text(text: &'a str) -> Self {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(e) => {
                warn!(error = %e, "Failed to read header row; source yields no records");
                StringRecord::new()
            },
        };

        // Duplicate names keep their first position; the later value wins.
        let mut columns: Vec<String> = Vec::with_capacity(headers.len());
        let mut slots = Vec::with_capacity(headers.len());
        for name in headers.iter().map(str::trim) {
            let slot = match columns.iter().position(|c| c == name) {
                Some(existing) => existing,
                None => {
                    columns.push(name.to_string());
                    columns.len() - 1
                },
            };
            slots.push(slot);
        }

        debug!(columns = ?columns, "Record source opened");

        Self {
            reader,
            columns,
            slots,
            record: StringRecord::new(),
            produced: 0,
        }
    }

    /// Column names from the header row
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of records yielded so far
    pub fn produced(&self) -> usize {
        self.produced
    }

    fn keyed(&self) -> Vec<(String, Option<String>)> {
        let mut values: Vec<Option<String>> = vec![None; self.columns.len()];
        for (position, slot) in self.slots.iter().enumerate() {
            if let Some(value) = self.record.get(position) {
                values[*slot] = Some(value.to_string());
            }
        }
        self.columns.iter().cloned().zip(values).collect()
    }
}

impl Iterator for RecordSource<'_> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        if self.columns.is_empty() {
            return None;
        }

        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {
                    self.produced += 1;
                    return Some(RawRecord::new(self.produced, self.keyed()));
                },
                Ok(false) => return None,
                Err(e) => {
                    // Input is already valid UTF-8 and the reader is flexible,
                    // so this is not expected; skip the record and keep going.
                    warn!(error = %e, after_row = self.produced, "Skipping unreadable record");
                },
            }
        }
    }
}
