use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::constants::JOIN_COLUMNS;

/// Join key shared by every table fetched for one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JoinKey {
    pub valid_time: NaiveDateTime,
    pub time: NaiveDateTime,
    pub step_hours: i64,
    pub point_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub key: JoinKey,
    pub values: BTreeMap<String, Option<f64>>,
}

impl TableRow {
    pub fn new(key: JoinKey) -> Self {
        Self {
            key,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, column: &str, value: Option<f64>) -> Self {
        self.values.insert(column.to_string(), value);
        self
    }
}

/// Result of one fetch task: pattern-specific variable columns keyed by [`JoinKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub pattern: String,
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl ResultTable {
    pub fn new(pattern: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            pattern: pattern.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: TableRow) {
        self.rows.push(row);
    }

    /// Column count including the join columns.
    pub fn column_count(&self) -> usize {
        JOIN_COLUMNS.len() + self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace non-finite values and upstream placeholders with nulls.
    /// Returns how many cells were cleared.
    pub fn normalize_sentinels(&mut self, sentinels: &[f64]) -> usize {
        let mut cleared = 0;
        for row in &mut self.rows {
            for value in row.values.values_mut() {
                if let Some(v) = *value {
                    if !v.is_finite() || sentinels.iter().any(|s| is_sentinel(v, *s)) {
                        *value = None;
                        cleared += 1;
                    }
                }
            }
        }
        cleared
    }
}

fn is_sentinel(value: f64, sentinel: f64) -> bool {
    value == sentinel || (value - sentinel).abs() <= sentinel.abs() * 1e-9
}

/// What a single fetch task delivers to the collector.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Table(ResultTable),
    /// The source had nothing for the window; reported so the collector never waits on it.
    Empty { pattern: String },
}

impl FetchOutcome {
    pub fn into_table(self) -> Option<ResultTable> {
        match self {
            FetchOutcome::Table(table) if !table.is_empty() => Some(table),
            _ => None,
        }
    }
}
