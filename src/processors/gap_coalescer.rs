use crate::models::FetchInterval;
use chrono::{Duration, NaiveDateTime};

/// Compresses sorted missing hours into contiguous ranges no longer than `max_span`.
pub struct GapCoalescer {
    max_span: Duration,
}

impl GapCoalescer {
    pub fn new(max_span: Duration) -> Self {
        Self { max_span }
    }

    /// `hours` must be sorted and free of duplicates.
    pub fn coalesce(&self, hours: &[NaiveDateTime]) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let mut ranges: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::new();
        let one_hour = Duration::hours(1);

        let mut i = 0;
        while i < hours.len() {
            let start = hours[i];
            let mut end = start;

            while i + 1 < hours.len()
                && hours[i + 1] == end + one_hour
                && hours[i + 1] - start <= self.max_span
            {
                end = hours[i + 1];
                i += 1;
            }

            ranges.push((start, end));
            i += 1;
        }

        // The final hour must always land in a range
        if let Some(last) = hours.last() {
            let covered = ranges
                .last()
                .is_some_and(|(start, end)| start <= last && last <= end);
            if !covered {
                ranges.push((*last, *last));
            }
        }

        ranges
    }

    /// Ranges as inclusive fetch intervals.
    pub fn coalesce_intervals(&self, hours: &[NaiveDateTime]) -> Vec<FetchInterval> {
        self.coalesce(hours)
            .into_iter()
            .map(|(start, end)| FetchInterval::inclusive(start, end))
            .collect()
    }
}
