use crate::models::{ObservationRecord, RecordKey, Variable};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutlierReport {
    pub repaired: usize,
    /// Out-of-range cells with no usable neighbour, left as they were.
    pub unrepaired: Vec<(RecordKey, Variable)>,
}

/// Replaces implausible values with the mean of the same series' adjacent hours.
pub struct OutlierFilter {
    min: f64,
    max: f64,
}

impl OutlierFilter {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn is_plausible(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn repair(&self, records: &mut [ObservationRecord]) -> OutlierReport {
        let index: HashMap<(u32, u32, NaiveDateTime), usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| ((r.point_id, r.fxx, r.time), i))
            .collect();

        // Neighbours are read from the unrepaired snapshot
        let snapshot: Vec<ObservationRecord> = records.to_vec();
        let mut report = OutlierReport::default();

        for record in records.iter_mut() {
            for variable in Variable::ALL {
                let Some(value) = record.get(variable) else {
                    continue;
                };
                if self.is_plausible(value) {
                    continue;
                }

                let neighbour = |offset: i64| {
                    index
                        .get(&(record.point_id, record.fxx, record.time + Duration::hours(offset)))
                        .and_then(|i| snapshot[*i].get(variable))
                        .filter(|v| self.is_plausible(*v))
                };

                let replacement = match (neighbour(-1), neighbour(1)) {
                    (Some(prev), Some(next)) => Some((prev + next) / 2.0),
                    (Some(only), None) | (None, Some(only)) => Some(only),
                    (None, None) => None,
                };

                match replacement {
                    Some(v) => {
                        record.set(variable, Some(v));
                        report.repaired += 1;
                    }
                    None => {
                        warn!(
                            point_id = record.point_id,
                            time = %record.time,
                            variable = %variable,
                            value,
                            "Outlier has no neighbour to repair from"
                        );
                        report.unrepaired.push((record.key(), variable));
                    }
                }
            }
        }

        if report.repaired > 0 {
            info!(repaired = report.repaired, "Repaired out-of-range values");
        }
        report
    }
}
