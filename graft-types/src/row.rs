//! Input rows as handed to the record mapper: column name to scalar
//! cell value, plus the row's position in the concatenated input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar cell from the input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl CellValue {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One input row.
///
/// `index` is the 0-based position in the deduplicated, concatenated
/// input; result records are ordered by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub index: usize,
    pub cells: BTreeMap<String, CellValue>,
}

impl Row {
    #[must_use]
    pub fn new(index: usize, cells: BTreeMap<String, CellValue>) -> Self {
        Self { index, cells }
    }

    /// Builds a row from (column, value) pairs.
    #[must_use]
    pub fn from_pairs<I, S>(index: usize, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, CellValue)>,
        S: Into<String>,
    {
        Self {
            index,
            cells: pairs.into_iter().map(|(c, v)| (c.into(), v)).collect(),
        }
    }

    /// Cell for `column`, if the column exists.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    /// True when every cell is empty.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(CellValue::is_empty)
    }
}
