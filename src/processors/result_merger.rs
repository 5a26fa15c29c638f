use crate::error::{FetchError, Result};
use crate::models::{JoinKey, ObservationRecord, ResultTable, TableRow, Variable};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Intermediate table while tables are being combined.
#[derive(Debug, Default)]
struct Accumulator {
    columns: Vec<String>,
    rows: Vec<TableRow>,
}

impl Accumulator {
    fn from_table(table: ResultTable) -> Self {
        Self {
            columns: table.columns,
            rows: table.rows,
        }
    }

    fn concat(&mut self, table: ResultTable) {
        for column in table.columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self.rows.extend(table.rows);
    }
}

pub struct ResultMerger {
    wide_threshold: usize,
    expected: Vec<Variable>,
}

impl ResultMerger {
    pub fn new(wide_threshold: usize) -> Self {
        Self {
            wide_threshold,
            expected: Variable::ALL.to_vec(),
        }
    }

    pub fn with_expected(mut self, expected: Vec<Variable>) -> Self {
        self.expected = expected;
        self
    }

    /// Combine every table fetched for one interval into canonical records.
    pub fn merge(&self, tables: Vec<ResultTable>) -> Result<Vec<ObservationRecord>> {
        let (wide, narrow): (Vec<_>, Vec<_>) = tables
            .into_iter()
            .partition(|t| t.column_count() >= self.wide_threshold);

        debug!(wide = wide.len(), narrow = narrow.len(), "Merging result tables");

        let mut narrow = narrow.into_iter();
        let mut accumulator = if wide.is_empty() {
            match narrow.next() {
                Some(first) => Accumulator::from_table(first),
                None => return Err(FetchError::MergeValidation("No tables to merge".to_string())),
            }
        } else {
            let mut acc = Accumulator::default();
            for table in wide {
                acc.concat(table);
            }
            acc
        };

        for (i, table) in narrow.enumerate() {
            accumulator = outer_join(accumulator, table, i + 1);
        }

        let rows = drop_duplicate_rows(accumulator.rows);
        self.project(&accumulator.columns, rows)
    }

    fn project(&self, columns: &[String], rows: Vec<TableRow>) -> Result<Vec<ObservationRecord>> {
        let present: HashSet<&str> = columns.iter().map(String::as_str).collect();
        let mut missing: BTreeSet<Variable> = self
            .expected
            .iter()
            .filter(|v| !present.contains(v.column_name()))
            .copied()
            .collect();

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = to_record(row)?;
            for variable in &self.expected {
                if record.get(*variable).is_none() {
                    missing.insert(*variable);
                }
            }
            records.push(record);
        }

        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|v| v.column_name()).collect();
            return Err(FetchError::MergeValidation(format!("Missing {}", names.join(","))));
        }

        let mut dropped = 0;
        for record in &mut records {
            dropped += record.extras.len();
            record.extras.clear();
        }
        if dropped > 0 {
            debug!(cells = dropped, "Dropped non-canonical columns");
        }

        records.sort_by_key(|r| r.key());
        Ok(records)
    }
}

/// Outer join on the full join key. Colliding columns get `_{i}` on the
/// accumulator side and `_{i}{i}` on the incoming side.
fn outer_join(acc: Accumulator, table: ResultTable, i: usize) -> Accumulator {
    let collisions: HashSet<String> = table
        .columns
        .iter()
        .filter(|c| acc.columns.contains(c))
        .cloned()
        .collect();

    let left_suffix = format!("_{}", i);
    let right_suffix = format!("_{}{}", i, i);
    let rename = |column: &str, suffix: &str| {
        if collisions.contains(column) {
            format!("{}{}", column, suffix)
        } else {
            column.to_string()
        }
    };

    let mut columns: Vec<String> = acc.columns.iter().map(|c| rename(c, &left_suffix)).collect();
    columns.extend(table.columns.iter().map(|c| rename(c, &right_suffix)));

    let relabel = |row: &TableRow, suffix: &str| -> BTreeMap<String, Option<f64>> {
        row.values
            .iter()
            .map(|(column, value)| (rename(column, suffix), *value))
            .collect()
    };

    let mut incoming: HashMap<JoinKey, Vec<&TableRow>> = HashMap::new();
    for row in &table.rows {
        incoming.entry(row.key).or_default().push(row);
    }

    let mut matched: HashSet<JoinKey> = HashSet::new();
    let mut rows = Vec::with_capacity(acc.rows.len().max(table.rows.len()));

    for left in &acc.rows {
        let left_values = relabel(left, &left_suffix);
        match incoming.get(&left.key) {
            Some(rights) => {
                matched.insert(left.key);
                for right in rights {
                    let mut values = left_values.clone();
                    values.extend(relabel(right, &right_suffix));
                    rows.push(TableRow {
                        key: left.key,
                        values,
                    });
                }
            }
            None => rows.push(TableRow {
                key: left.key,
                values: left_values,
            }),
        }
    }

    for right in &table.rows {
        if !matched.contains(&right.key) {
            rows.push(TableRow {
                key: right.key,
                values: relabel(right, &right_suffix),
            });
        }
    }

    Accumulator { columns, rows }
}

fn drop_duplicate_rows(rows: Vec<TableRow>) -> Vec<TableRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let fingerprint: Vec<(String, Option<u64>)> = row
                .values
                .iter()
                .map(|(c, v)| (c.clone(), v.map(f64::to_bits)))
                .collect();
            seen.insert((row.key, fingerprint))
        })
        .collect()
}

fn to_record(row: TableRow) -> Result<ObservationRecord> {
    let fxx = u32::try_from(row.key.step_hours).map_err(|_| {
        FetchError::InvalidFormat(format!("Negative forecast step: {}h", row.key.step_hours))
    })?;

    let mut record =
        ObservationRecord::new(row.key.point_id, row.key.time, fxx).with_valid_time(row.key.valid_time);

    for (column, value) in row.values {
        match Variable::from_column(&column) {
            Some(variable) => record.set(variable, value),
            None => {
                if let Some(v) = value {
                    record.extras.insert(column, v);
                }
            }
        }
    }

    Ok(record)
}
