use crate::models::{ObservationRecord, Variable};
use crate::utils::constants::{MAX_PLAUSIBLE_VALUE, MIN_PLAUSIBLE_VALUE};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct StoreStatistics {
    pub total_records: usize,
    pub points: BTreeSet<u32>,
    pub fxx: BTreeSet<u32>,
    pub time_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub valid_time_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub incomplete_records: usize,
    pub nulls_by_variable: BTreeMap<Variable, usize>,
    pub implausible_values: usize,
}

impl StoreStatistics {
    pub fn complete_percentage(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        (self.total_records - self.incomplete_records) as f64 / self.total_records as f64 * 100.0
    }

    pub fn summary(&self) -> String {
        let span = |range: &Option<(NaiveDateTime, NaiveDateTime)>| match range {
            Some((first, last)) => format!("{} to {}", first, last),
            None => "n/a".to_string(),
        };
        let join = |set: &BTreeSet<u32>| {
            set.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "Store Summary:\n\
            - Records: {}\n\
            - Points: {} ({})\n\
            - Forecast leads: {}\n\
            - Time span: {}\n\
            - Valid time span: {}",
            self.total_records,
            self.points.len(),
            join(&self.points),
            join(&self.fxx),
            span(&self.time_range),
            span(&self.valid_time_range),
        )
    }

    pub fn detailed_summary(&self) -> String {
        let mut summary = self.summary();
        summary.push_str(&format!(
            "\n\nData Completeness:\n\
            - Complete records: {}/{} ({:.1}%)\n\
            - Out-of-range values: {}",
            self.total_records - self.incomplete_records,
            self.total_records,
            self.complete_percentage(),
            self.implausible_values,
        ));

        if !self.nulls_by_variable.is_empty() {
            summary.push_str("\n\nNulls by column:");
            for (variable, count) in &self.nulls_by_variable {
                summary.push_str(&format!("\n- {}: {}", variable, count));
            }
        }
        summary
    }
}

pub struct StoreAnalyzer;

impl StoreAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, records: &[ObservationRecord]) -> StoreStatistics {
        let mut stats = StoreStatistics {
            total_records: records.len(),
            ..Default::default()
        };

        for record in records {
            stats.points.insert(record.point_id);
            stats.fxx.insert(record.fxx);
            stats.time_range = Some(widen(stats.time_range, record.time));
            stats.valid_time_range = Some(widen(stats.valid_time_range, record.valid_time));

            let missing = record.missing_variables();
            if !missing.is_empty() {
                stats.incomplete_records += 1;
            }
            for variable in missing {
                *stats.nulls_by_variable.entry(variable).or_default() += 1;
            }

            stats.implausible_values += Variable::ALL
                .iter()
                .filter_map(|v| record.get(*v))
                .filter(|v| !(MIN_PLAUSIBLE_VALUE..=MAX_PLAUSIBLE_VALUE).contains(v))
                .count();
        }

        stats
    }
}

impl Default for StoreAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn widen(
    range: Option<(NaiveDateTime, NaiveDateTime)>,
    ts: NaiveDateTime,
) -> (NaiveDateTime, NaiveDateTime) {
    match range {
        Some((first, last)) => (first.min(ts), last.max(ts)),
        None => (ts, ts),
    }
}
