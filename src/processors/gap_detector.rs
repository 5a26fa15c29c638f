use crate::models::ObservationRecord;
use crate::utils::constants::FORECAST_HORIZON_HOURS;
use crate::utils::timestamps::hourly_range;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Which timestamp column defines the expected hourly grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeColumn {
    #[default]
    Time,
    ValidTime,
}

impl TimeColumn {
    pub fn of(&self, record: &ObservationRecord) -> NaiveDateTime {
        match self {
            TimeColumn::Time => record.time,
            TimeColumn::ValidTime => record.valid_time,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapReport {
    pub expected_hours: usize,
    pub absent: BTreeSet<NaiveDateTime>,
    pub incomplete: BTreeSet<NaiveDateTime>,
}

impl GapReport {
    /// Sorted, deduplicated union of absent and incomplete hours.
    pub fn missing(&self) -> Vec<NaiveDateTime> {
        self.absent.union(&self.incomplete).copied().collect()
    }

    pub fn is_clean(&self) -> bool {
        self.absent.is_empty() && self.incomplete.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("=== Gap Report ===\n");
        summary.push_str(&format!("Expected hours: {}\n", self.expected_hours));
        summary.push_str(&format!("Absent hours: {}\n", self.absent.len()));
        summary.push_str(&format!("Incomplete hours: {}\n", self.incomplete.len()));
        summary.push_str(&format!("Missing (union): {}\n", self.missing().len()));
        summary
    }
}

/// Rows stored for a point against the count a complete span implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointCompleteness {
    pub point_id: u32,
    pub observed: usize,
    pub expected: usize,
}

pub struct GapDetector {
    excluded_months: Vec<u32>,
}

impl GapDetector {
    pub fn new(excluded_months: Vec<u32>) -> Self {
        Self { excluded_months }
    }

    /// Hourly grid over `[min, max]` without the excluded months.
    pub fn expected_grid(&self, min: NaiveDateTime, max: NaiveDateTime) -> Vec<NaiveDateTime> {
        hourly_range(min, max, &self.excluded_months)
    }

    /// Full scan of `[min, max]`.
    ///
    /// An hour counts as present only when every point seen in the snapshot
    /// has a row for it, whatever its lead. A forecast store holds each valid
    /// hour under a single fxx.
    pub fn scan(
        &self,
        records: &[ObservationRecord],
        min: NaiveDateTime,
        max: NaiveDateTime,
        column: TimeColumn,
    ) -> GapReport {
        let grid = self.expected_grid(min, max);

        let points: HashSet<u32> = records.iter().map(|r| r.point_id).collect();
        let mut coverage: HashMap<NaiveDateTime, HashSet<u32>> = HashMap::new();
        let mut incomplete = BTreeSet::new();

        for record in records {
            let ts = column.of(record);
            coverage
                .entry(ts)
                .or_default()
                .insert(record.point_id);

            if !record.is_complete() && ts >= min && ts <= max {
                incomplete.insert(ts);
            }
        }

        let absent: BTreeSet<NaiveDateTime> = grid
            .iter()
            .filter(|ts| {
                coverage
                    .get(ts)
                    .map_or(true, |present| present.len() < points.len())
            })
            .copied()
            .collect();

        debug!(
            grid = grid.len(),
            absent = absent.len(),
            incomplete = incomplete.len(),
            "Scanned store for gaps"
        );

        GapReport {
            expected_hours: grid.len(),
            absent,
            incomplete,
        }
    }

    /// Points whose row count differs from `hours(span) + 24`.
    pub fn check_points(
        &self,
        records: &[ObservationRecord],
        span_start: NaiveDateTime,
        span_end: NaiveDateTime,
    ) -> Vec<PointCompleteness> {
        let hours = (span_end - span_start).num_hours().max(0) as usize;
        let expected = hours + FORECAST_HORIZON_HOURS as usize;

        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for record in records {
            *counts.entry(record.point_id).or_default() += 1;
        }

        counts
            .into_iter()
            .filter(|(_, observed)| *observed != expected)
            .map(|(point_id, observed)| PointCompleteness {
                point_id,
                observed,
                expected,
            })
            .collect()
    }
}
