use crate::error::FetchError;
use crate::models::{ObservationRecord, Variable};
use crate::writers::observation_store::normalize_records;
use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct InterpolationReport {
    pub synthesized: usize,
    /// One `InterpolationInsufficientData` per skipped (hour, point, fxx).
    pub skipped: Vec<FetchError>,
}

impl InterpolationReport {
    fn absorb(&mut self, other: InterpolationReport) {
        self.synthesized += other.synthesized;
        self.skipped.extend(other.skipped);
    }
}

/// Last-resort filler: a missing hour becomes the mean of the hours either side.
pub struct Interpolator {
    index: HashMap<(u32, u32, NaiveDateTime), usize>,
}

impl Interpolator {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
        }
    }

    fn reindex(&mut self, records: &[ObservationRecord]) {
        self.index.clear();
        for (i, record) in records.iter().enumerate() {
            self.index.insert((record.point_id, record.fxx, record.time), i);
        }
    }

    /// Append synthesized rows for `t` to `records`. Existing rows are never modified.
    pub fn interpolate_hour(
        &mut self,
        records: &mut Vec<ObservationRecord>,
        t: NaiveDateTime,
    ) -> InterpolationReport {
        self.reindex(records);
        self.fill_hour(records, t)
    }

    fn fill_hour(
        &mut self,
        records: &mut Vec<ObservationRecord>,
        t: NaiveDateTime,
    ) -> InterpolationReport {
        debug!(time = %t, "Interpolating");

        let pairs: BTreeSet<(u32, u32)> = records.iter().map(|r| (r.point_id, r.fxx)).collect();
        let mut report = InterpolationReport::default();

        for (point_id, fxx) in pairs {
            let already_complete = self
                .index
                .get(&(point_id, fxx, t))
                .is_some_and(|i| records[*i].is_complete());
            if already_complete {
                continue;
            }

            let before = self.index.get(&(point_id, fxx, t - Duration::hours(1)));
            let after = self.index.get(&(point_id, fxx, t + Duration::hours(1)));

            let (before, after) = match (before, after) {
                (Some(b), Some(a)) => (&records[*b], &records[*a]),
                (b, a) => {
                    let found = usize::from(b.is_some()) + usize::from(a.is_some());
                    let error = FetchError::InterpolationInsufficientData {
                        time: t,
                        point_id,
                        fxx,
                        found,
                    };
                    warn!("{}", error);
                    report.skipped.push(error);
                    continue;
                }
            };

            let mut synthesized = ObservationRecord::new(point_id, t, fxx);
            for variable in Variable::ALL {
                let mean = match (before.get(variable), after.get(variable)) {
                    (Some(x), Some(y)) => Some((x + y) / 2.0),
                    _ => None,
                };
                synthesized.set(variable, mean);
            }

            self.index.insert((point_id, fxx, t), records.len());
            records.push(synthesized);
            report.synthesized += 1;
        }

        report
    }

    /// Interpolate every hour in order, then dedup, sort and drop rows still holding nulls.
    pub fn fill(
        &mut self,
        mut records: Vec<ObservationRecord>,
        hours: &[NaiveDateTime],
    ) -> (Vec<ObservationRecord>, InterpolationReport) {
        let mut sorted = hours.to_vec();
        sorted.sort();
        sorted.dedup();

        self.reindex(&records);
        let mut report = InterpolationReport::default();
        for t in sorted {
            let hour_report = self.fill_hour(&mut records, t);
            report.absorb(hour_report);
        }

        (Self::finalize(records), report)
    }

    pub fn finalize(records: Vec<ObservationRecord>) -> Vec<ObservationRecord> {
        let before = records.len();
        let kept: Vec<ObservationRecord> = normalize_records(records)
            .into_iter()
            .filter(ObservationRecord::is_complete)
            .collect();
        if kept.len() < before {
            debug!(dropped = before - kept.len(), "Dropped duplicate or incomplete rows");
        }
        kept
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn t() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn filled(point_id: u32, time: NaiveDateTime, base: f64) -> ObservationRecord {
        let mut record = ObservationRecord::new(point_id, time, 1);
        for (i, variable) in Variable::ALL.into_iter().enumerate() {
            record.set(variable, Some(base + i as f64));
        }
        record
    }

    #[test]
    fn test_mean_of_neighbours_round_trip() {
        let original = vec![
            filled(4, t() - Duration::hours(1), 10.0),
            filled(4, t() + Duration::hours(1), 20.0),
        ];
        let mut records = original.clone();

        let mut interpolator = Interpolator::new();
        let report = interpolator.interpolate_hour(&mut records, t());

        assert_eq!(report.synthesized, 1);
        assert!(report.skipped.is_empty());
        assert_eq!(records.len(), 3);

        let new_row = &records[2];
        assert_eq!(new_row.time, t());
        assert_eq!(new_row.valid_time, t() + Duration::hours(1));
        assert_eq!(new_row.point_id, 4);
        assert_eq!(new_row.fxx, 1);
        for (i, variable) in Variable::ALL.into_iter().enumerate() {
            assert_eq!(new_row.get(variable), Some(15.0 + i as f64));
        }

        let restored: Vec<_> = records.into_iter().filter(|r| r.time != t()).collect();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_single_neighbour_is_skipped() {
        let mut records = vec![filled(4, t() - Duration::hours(1), 10.0)];
        let mut interpolator = Interpolator::new();
        let report = interpolator.interpolate_hour(&mut records, t());

        assert_eq!(report.synthesized, 0);
        assert_eq!(records.len(), 1);
        assert!(matches!(
            report.skipped.as_slice(),
            [FetchError::InterpolationInsufficientData { found: 1, point_id: 4, .. }]
        ));
    }

    #[test]
    fn test_complete_rows_are_left_alone() {
        let mut records = vec![
            filled(4, t() - Duration::hours(1), 10.0),
            filled(4, t(), 99.0),
            filled(4, t() + Duration::hours(1), 20.0),
        ];
        let report = Interpolator::new().interpolate_hour(&mut records, t());
        assert_eq!(report.synthesized, 0);
        assert_eq!(records[1].t, Some(99.0));
    }

    #[test]
    fn test_fill_replaces_incomplete_and_drops_leftovers() {
        let mut broken = filled(4, t(), 0.0);
        broken.sde = None;
        let mut orphan = filled(4, t() + Duration::hours(5), 0.0);
        orphan.r2 = None;

        let records = vec![
            filled(4, t() - Duration::hours(1), 10.0),
            broken,
            filled(4, t() + Duration::hours(1), 20.0),
            orphan,
        ];

        let (result, report) =
            Interpolator::new().fill(records, &[t() + Duration::hours(5), t()]);

        assert_eq!(report.synthesized, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(ObservationRecord::is_complete));
        assert!(result.windows(2).all(|w| w[0].time <= w[1].time));
        assert_eq!(result[1].t, Some(15.0));
    }

    #[test]
    fn test_consecutive_gap_uses_synthesized_neighbour() {
        let records = vec![
            filled(1, t() - Duration::hours(1), 0.0),
            filled(1, t() + Duration::hours(1), 4.0),
            filled(1, t() + Duration::hours(3), 8.0),
        ];
        let (result, report) =
            Interpolator::new().fill(records, &[t(), t() + Duration::hours(2)]);

        assert_eq!(report.synthesized, 2);
        assert_eq!(result.len(), 5);
        assert_eq!(result[2].t, Some(4.0));
        assert_eq!(result[3].t, Some(6.0));
    }
}
