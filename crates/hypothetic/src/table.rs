//! A small column-ordered table of metadata values.

use std::collections::BTreeMap;

use serde::Serialize;

use hypothetic_common::{HypotheticError, HypotheticResult, MetadataValue};

/// Rows of [`MetadataValue`]s under an ordered set of column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<MetadataValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. The row must have one value per column.
    pub fn push_row(&mut self, row: Vec<MetadataValue>) -> HypotheticResult<()> {
        if row.len() != self.columns.len() {
            return Err(HypotheticError::configuration(format!(
                "row has {} values but table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<MetadataValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&MetadataValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn row(&self, index: usize) -> Option<&[MetadataValue]> {
        self.rows.get(index).map(|r| r.as_slice())
    }

    /// One row as a column name -> value map.
    pub fn record(&self, index: usize) -> Option<BTreeMap<String, MetadataValue>> {
        let row = self.rows.get(index)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        )
    }

    /// A new table holding only the columns at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Table {
        Table {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }

    /// Row indices grouped by the rendered value of `column`, in order of
    /// first appearance.
    pub fn group_rows(&self, column: &str) -> Option<Vec<(MetadataValue, Vec<usize>)>> {
        let idx = self.column_index(column)?;
        let mut groups: Vec<(MetadataValue, Vec<usize>)> = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            let key = row[idx].render();
            match groups.iter_mut().find(|(v, _)| v.render() == key) {
                Some((_, members)) => members.push(i),
                None => groups.push((row[idx].clone(), vec![i])),
            }
        }
        Some(groups)
    }
}
