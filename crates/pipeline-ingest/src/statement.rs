//! Statement builder: parameterized inserts against one configured table
//!
//! All identifier quoting goes through [`quote_ident`]. Values never appear in
//! statement text; they are bound as parameters.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::{NormalizedRow, RowClass};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("row {0} has no columns")]
    NoColumns(usize),

    #[error("row {0} is not loadable")]
    NotLoadable(usize),

    #[error("invalid table name: {0}")]
    InvalidTable(String),
}

/// Quote a PostgreSQL identifier: wrap in double quotes, double any embedded
/// double quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema-qualified insert target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedTable {
    schema: String,
    table: String,
}

impl QualifiedTable {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self, BuildError> {
        let schema = schema.into().trim().to_string();
        let table = table.into().trim().to_string();
        if schema.is_empty() || table.is_empty() {
            return Err(BuildError::InvalidTable(format!("{:?}.{:?}", schema, table)));
        }
        if schema.contains('\0') || table.contains('\0') {
            return Err(BuildError::InvalidTable("identifier contains NUL".to_string()));
        }
        Ok(Self { schema, table })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// Column name -> catalog type name, e.g. `"id" -> "integer"`.
pub type ColumnTypes = HashMap<String, String>;

/// Shape of one insert. Built per row; rows may differ in shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    table: QualifiedTable,
    columns: Vec<String>,
    placeholder_count: usize,
}

impl InsertStatement {
    pub fn table(&self) -> &QualifiedTable {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholder_count
    }

    /// Statement text with untyped placeholders.
    pub fn sql(&self) -> String {
        self.render(|_, n| format!("${}", n))
    }

    /// Statement text casting each placeholder to its column's catalog type.
    /// Columns missing from `types` keep a bare placeholder.
    pub fn sql_with_types(&self, types: &ColumnTypes) -> String {
        self.render(|column, n| match types.get(column) {
            Some(ty) => format!("CAST(${} AS {})", n, ty),
            None => format!("${}", n),
        })
    }

    fn render(&self, placeholder: impl Fn(&str, usize) -> String) -> String {
        let fields = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let params = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| placeholder(c, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", self.table, fields, params)
    }
}

/// A statement together with its values in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundInsert {
    pub row_number: usize,
    pub statement: InsertStatement,
    pub values: Vec<Option<String>>,
}

/// Build the insert for a loadable row.
pub fn build(table: &QualifiedTable, row: NormalizedRow) -> Result<BoundInsert, BuildError> {
    let row_number = row.row_number();
    if row.class() != RowClass::Loadable {
        return Err(BuildError::NotLoadable(row_number));
    }
    if row.columns().is_empty() {
        return Err(BuildError::NoColumns(row_number));
    }

    let (columns, values) = row.into_parts();
    let placeholder_count = columns.len();

    Ok(BoundInsert {
        row_number,
        statement: InsertStatement {
            table: table.clone(),
            columns,
            placeholder_count,
        },
        values,
    })
}
