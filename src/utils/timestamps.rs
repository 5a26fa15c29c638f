use crate::error::{FetchError, Result};
use crate::utils::constants::{LOG_TIMESTAMP_FORMAT, TIMESTAMP_FORMAT};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

/// Parse a timestamp in any of the layouts the store and logs have used.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for format in [
        TIMESTAMP_FORMAT,
        LOG_TIMESTAMP_FORMAT,
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }

    // Bare dates mean midnight
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        .map_err(|_| FetchError::InvalidFormat(format!("Unrecognised timestamp: '{}'", raw)))
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Every hour in `[start, end]`, optionally dropping the given months.
pub fn hourly_range(
    start: NaiveDateTime,
    end: NaiveDateTime,
    excluded_months: &[u32],
) -> Vec<NaiveDateTime> {
    let mut hours = Vec::new();
    let mut current = start;
    while current <= end {
        if !excluded_months.contains(&current.month()) {
            hours.push(current);
        }
        current += Duration::hours(1);
    }
    hours
}

pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

/// Serde adapter for store timestamps.
pub mod timestamp_serde {
    use super::{format_timestamp, parse_timestamp};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
