//! Replacement coordinate extraction.

use std::collections::HashSet;

use tracing::debug;

use crate::table::Table;

/// Drop `drop_columns` and every column holding a single distinct value.
///
/// What is left are the columns that vary from row to row, in their original
/// order and unmodified. Values are compared by their rendered form, so `6`
/// and `6.0` count as the same value.
pub fn reduce_coordinates(table: &Table, drop_columns: &[&str]) -> Table {
    let keep: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !drop_columns.contains(&name.as_str()))
        .filter(|(idx, _)| distinct_count(table, *idx) != 1)
        .map(|(idx, _)| idx)
        .collect();

    let reduced = table.select(&keep);
    debug!(
        kept = ?reduced.columns(),
        dropped = table.columns().len() - keep.len(),
        "Reduced replacement coordinates"
    );
    reduced
}

fn distinct_count(table: &Table, column: usize) -> usize {
    table
        .rows()
        .iter()
        .map(|row| row[column].render())
        .collect::<HashSet<_>>()
        .len()
}
