use crate::error::{FetchError, Result};
use crate::models::FetchInterval;
use crate::utils::constants::{INTERVALS_PER_DAY, INTERVAL_HOURS};
use chrono::{Datelike, Duration, NaiveDateTime};
use tracing::{debug, warn};

/// What the caller asked to fetch. Exactly one form may be used.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub start: Option<NaiveDateTime>,
    pub days: Option<u32>,
    pub intervals: Vec<FetchInterval>,
}

impl PlanRequest {
    pub fn by_count(start: NaiveDateTime, days: u32) -> Self {
        Self {
            start: Some(start),
            days: Some(days),
            intervals: Vec::new(),
        }
    }

    pub fn explicit(intervals: Vec<FetchInterval>) -> Self {
        Self {
            start: None,
            days: None,
            intervals,
        }
    }
}

pub struct IntervalPlanner {
    excluded_months: Vec<u32>,
}

impl IntervalPlanner {
    pub fn new(excluded_months: Vec<u32>) -> Self {
        Self { excluded_months }
    }

    /// Resolve a request into the ordered list of windows to fetch.
    pub fn plan(&self, request: &PlanRequest, now: NaiveDateTime) -> Result<Vec<FetchInterval>> {
        let by_count = request.start.is_some() || request.days.is_some();
        let explicit = !request.intervals.is_empty();

        let intervals = match (by_count, explicit) {
            (true, false) => match (request.start, request.days) {
                (Some(start), Some(days)) => self.plan_by_count(start, days, now),
                _ => {
                    return Err(FetchError::Configuration(
                        "start date and day count must be given together".to_string(),
                    ))
                }
            },
            (false, true) => {
                self.validate_explicit(&request.intervals)?;
                request.intervals.clone()
            }
            (true, true) => {
                return Err(FetchError::Configuration(
                    "give either a start date and day count or explicit intervals, not both"
                        .to_string(),
                ))
            }
            (false, false) => {
                return Err(FetchError::Configuration(
                    "either a start date and day count or a list of intervals must be given"
                        .to_string(),
                ))
            }
        };

        if intervals.is_empty() {
            return Err(FetchError::Configuration("No intervals given".to_string()));
        }

        Ok(intervals)
    }

    /// Four 6-hour windows per day, stopping before data too recent to exist upstream.
    pub fn plan_by_count(
        &self,
        start: NaiveDateTime,
        days: u32,
        now: NaiveDateTime,
    ) -> Vec<FetchInterval> {
        let mut intervals = Vec::new();

        for day in 0..i64::from(days) {
            let day_start = start + Duration::days(day);

            if day_start > now - Duration::days(1) {
                warn!(day = %day_start, "Day is too close to the current day, stopping plan");
                break;
            }

            if self.excluded_months.contains(&day_start.month()) {
                continue;
            }

            for i in 0..INTERVALS_PER_DAY {
                let interval_start = day_start + Duration::hours(INTERVAL_HOURS * i);
                let interval_end = interval_start + Duration::hours(INTERVAL_HOURS);
                intervals.push(FetchInterval::half_open(interval_start, interval_end));
            }
        }

        debug!(count = intervals.len(), "Planned intervals by day count");
        intervals
    }

    pub fn validate_explicit(&self, intervals: &[FetchInterval]) -> Result<()> {
        if let Some(bad) = intervals.iter().find(|i| !i.is_ordered()) {
            return Err(FetchError::Configuration(format!(
                "Interval start must not be after its end: {} > {}",
                bad.start, bad.end
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Boundary;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn planner() -> IntervalPlanner {
        IntervalPlanner::new(vec![6, 7, 8, 9])
    }

    #[test]
    fn test_four_windows_per_day() {
        let intervals = planner().plan_by_count(at(2025, 1, 1, 0), 2, at(2025, 3, 1, 0));

        assert_eq!(intervals.len(), 8);
        assert_eq!(intervals[0].start, at(2025, 1, 1, 0));
        assert_eq!(intervals[0].end, at(2025, 1, 1, 6));
        assert_eq!(intervals[3].start, at(2025, 1, 1, 18));
        assert_eq!(intervals[7].end, at(2025, 1, 3, 0));
        assert!(intervals.iter().all(|i| i.boundary == Boundary::HalfOpen));
        assert!(intervals.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn test_excluded_months_skipped() {
        let intervals = planner().plan_by_count(at(2025, 5, 31, 0), 3, at(2026, 1, 1, 0));

        // May 31 only; June 1 and 2 are excluded
        assert_eq!(intervals.len(), 4);
        assert!(intervals.iter().all(|i| i.start.month() == 5));
    }

    #[test]
    fn test_stops_near_now() {
        let now = at(2025, 1, 5, 12);
        let intervals = planner().plan_by_count(at(2025, 1, 1, 0), 30, now);

        // Jan 1-4 are old enough, Jan 5 is within a day of now
        assert_eq!(intervals.len(), 16);
    }

    #[test]
    fn test_plan_requires_exactly_one_form() {
        let now = at(2025, 3, 1, 0);
        let p = planner();

        assert!(matches!(
            p.plan(&PlanRequest::default(), now),
            Err(FetchError::Configuration(_))
        ));

        let mut both = PlanRequest::by_count(at(2025, 1, 1, 0), 1);
        both.intervals = vec![FetchInterval::inclusive(at(2025, 1, 1, 0), at(2025, 1, 1, 2))];
        assert!(matches!(p.plan(&both, now), Err(FetchError::Configuration(_))));

        let start_only = PlanRequest {
            start: Some(at(2025, 1, 1, 0)),
            ..Default::default()
        };
        assert!(matches!(
            p.plan(&start_only, now),
            Err(FetchError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_plan_is_configuration_error() {
        // Every day lands in an excluded month
        let request = PlanRequest::by_count(at(2025, 7, 1, 0), 5);
        assert!(matches!(
            planner().plan(&request, at(2026, 1, 1, 0)),
            Err(FetchError::Configuration(_))
        ));
    }

    #[test]
    fn test_explicit_intervals_validated() {
        let now = at(2025, 3, 1, 0);
        let good = vec![FetchInterval::inclusive(at(2025, 1, 1, 0), at(2025, 1, 1, 2))];
        assert_eq!(
            planner().plan(&PlanRequest::explicit(good.clone()), now).unwrap(),
            good
        );

        let reversed = vec![FetchInterval::inclusive(at(2025, 1, 1, 5), at(2025, 1, 1, 2))];
        assert!(matches!(
            planner().plan(&PlanRequest::explicit(reversed), now),
            Err(FetchError::Configuration(_))
        ));
    }
}
