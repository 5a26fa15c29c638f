use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an interval's end hour belongs to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Boundary {
    /// `[start, end]`
    #[default]
    Inclusive,
    /// `[start, end)`
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub boundary: Boundary,
}

impl FetchInterval {
    pub fn inclusive(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            boundary: Boundary::Inclusive,
        }
    }

    pub fn half_open(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            boundary: Boundary::HalfOpen,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }

    /// The hourly dates this interval asks the upstream source for.
    pub fn hours(&self) -> Vec<NaiveDateTime> {
        let mut hours = Vec::new();
        let mut current = self.start;
        while current < self.end || (self.boundary == Boundary::Inclusive && current == self.end) {
            hours.push(current);
            current += Duration::hours(1);
        }
        hours
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        match self.boundary {
            Boundary::Inclusive => *ts >= self.start && *ts <= self.end,
            Boundary::HalfOpen => *ts >= self.start && *ts < self.end,
        }
    }
}

impl fmt::Display for FetchInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.boundary {
            Boundary::Inclusive => write!(f, "[{} - {}]", self.start, self.end),
            Boundary::HalfOpen => write!(f, "[{} - {})", self.start, self.end),
        }
    }
}
