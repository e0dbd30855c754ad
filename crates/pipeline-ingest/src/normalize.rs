//! Row normalizer: trims a raw record and classifies it
//!
//! Classification is deliberately permissive. Only rows whose every value is
//! missing or blank are held back; anything else is attempted against the
//! database and left for it to accept or reject.

use serde::Serialize;

use crate::source::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowClass {
    /// Every value is missing or blank after trimming
    Empty,
    /// Reserved for structurally invalid rows. The normalizer never assigns
    /// it; stricter validation would drop rows the database might accept.
    Malformed,
    Loadable,
}

/// A trimmed record with index-aligned columns and values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    row_number: usize,
    columns: Vec<String>,
    values: Vec<Option<String>>,
    class: RowClass,
}

impl NormalizedRow {
    pub fn row_number(&self) -> usize {
        self.row_number
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn class(&self) -> RowClass {
        self.class
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Option<String>>) {
        (self.columns, self.values)
    }
}

/// Trim column names and values, then classify. Total over its input.
pub fn normalize(raw: RawRecord) -> NormalizedRow {
    let (columns, values): (Vec<String>, Vec<Option<String>>) = raw
        .fields
        .into_iter()
        .map(|(name, value)| (name.trim().to_string(), value.map(|v| v.trim().to_string())))
        .unzip();

    let all_blank = values
        .iter()
        .all(|v| v.as_deref().map_or(true, str::is_empty));

    // A zero-column row is not "blank": it goes on to the statement builder,
    // which rejects it.
    let class = if all_blank && !values.is_empty() {
        RowClass::Empty
    } else {
        RowClass::Loadable
    };

    NormalizedRow {
        row_number: raw.row_number,
        columns,
        values,
        class,
    }
}
