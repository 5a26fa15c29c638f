use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FetchError;
use crate::models::FetchInterval;

/// Why an interval was not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Timeout,
    Upstream,
    MissingData,
    Storage,
    StillMissing,
    Other,
}

impl FailureKind {
    pub fn classify(error: &FetchError) -> Self {
        match error {
            FetchError::FetchTimeout { .. } => FailureKind::Timeout,
            FetchError::Upstream { .. } | FetchError::Http(_) | FetchError::Json(_) => {
                FailureKind::Upstream
            }
            FetchError::MergeValidation(_) => FailureKind::MissingData,
            FetchError::Io(_) | FetchError::Csv(_) => FailureKind::Storage,
            _ => FailureKind::Other,
        }
    }

    /// Best-effort recovery of the kind from a persisted message.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("still missing") {
            FailureKind::StillMissing
        } else if lower.contains("did not deliver") || lower.contains("timeout") {
            FailureKind::Timeout
        } else if lower.contains("missing") {
            FailureKind::MissingData
        } else if lower.contains("upstream") || lower.contains("http") {
            FailureKind::Upstream
        } else if lower.contains("i/o") || lower.contains("csv") {
            FailureKind::Storage
        } else {
            FailureKind::Other
        }
    }
}

/// One line of the error log.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorLogEntry {
    pub logged_at: NaiveDateTime,
    pub interval: FetchInterval,
    pub kind: FailureKind,
    pub message: String,
}

impl ErrorLogEntry {
    pub fn new(
        logged_at: NaiveDateTime,
        interval: FetchInterval,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        // Messages must stay on one line
        let message = message.into().replace(['\n', '\r'], " ");
        Self {
            logged_at,
            interval,
            kind,
            message,
        }
    }

    pub fn from_error(logged_at: NaiveDateTime, interval: FetchInterval, error: &FetchError) -> Self {
        Self::new(
            logged_at,
            interval,
            FailureKind::classify(error),
            error.to_string(),
        )
    }
}

/// Result of processing one interval.
#[derive(Debug, Clone, PartialEq)]
pub enum IntervalStatus {
    Persisted { rows: usize },
    Failed(ErrorLogEntry),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalOutcome {
    pub interval: FetchInterval,
    pub status: IntervalStatus,
}

impl IntervalOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self.status, IntervalStatus::Persisted { .. })
    }
}

/// Per-run tally of interval outcomes.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<IntervalOutcome>,
}

impl RunSummary {
    pub fn persisted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_persisted()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.persisted()
    }

    pub fn rows_written(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                IntervalStatus::Persisted { rows } => rows,
                IntervalStatus::Failed(_) => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ErrorLogEntry> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            IntervalStatus::Failed(entry) => Some(entry),
            IntervalStatus::Persisted { .. } => None,
        })
    }

    pub fn extend(&mut self, other: RunSummary) {
        self.outcomes.extend(other.outcomes);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Fetch Summary ===")?;
        writeln!(f, "Intervals: {}", self.outcomes.len())?;
        writeln!(f, "Persisted: {}", self.persisted())?;
        writeln!(f, "Failed: {}", self.failed())?;
        write!(f, "Rows written: {}", self.rows_written())?;
        for (i, failure) in self.failures().take(10).enumerate() {
            write!(
                f,
                "\n  {}. {}: {}",
                i + 1,
                failure.interval,
                failure.message
            )?;
        }
        Ok(())
    }
}
