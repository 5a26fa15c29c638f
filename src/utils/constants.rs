/// Canonical store column order
pub const CANONICAL_COLUMNS: [&str; 17] = [
    "time",
    "valid_time",
    "fxx",
    "t",
    "prate",
    "sde",
    "tp",
    "sdswrf",
    "suswrf",
    "sdlwrf",
    "sulwrf",
    "point_id",
    "t2m",
    "r2",
    "si10",
    "wdir10",
    "max_10si",
];

/// Columns every fetched table is joined on
pub const JOIN_COLUMNS: [&str; 4] = ["valid_time", "time", "step", "point_id"];

/// Timestamp formats
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const LOG_TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// File names
pub const DEFAULT_OUTPUT_DIR: &str = "data/fetched";
pub const DEFAULT_OUTPUT_FILE: &str = "weather.csv";
pub const DEFAULT_ERROR_LOG: &str = "logs/fetch_error_log.txt";
pub const DEFAULT_RESUME_MARKER: &str = "logs/date_log.txt";

/// Fetch defaults
pub const DEFAULT_COLLECT_TIMEOUT_SECS: u64 = 75;
pub const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WIDE_PATTERN_LEN: usize = 20;
pub const DEFAULT_WIDE_COLUMN_THRESHOLD: usize = 20;
pub const INTERVALS_PER_DAY: i64 = 4;
pub const INTERVAL_HOURS: i64 = 6;

/// Gap defaults
pub const DEFAULT_EXCLUDED_MONTHS: [u32; 4] = [6, 7, 8, 9];
pub const DEFAULT_MAX_RANGE_HOURS: i64 = 6;
pub const FORECAST_HORIZON_HOURS: i64 = 24;

/// Upstream missing-value placeholders
pub const DEFAULT_SENTINELS: [f64; 2] = [-9999.0, 9.999e20];

/// Physically plausible bounds for every variable
pub const MIN_PLAUSIBLE_VALUE: f64 = -10.0;
pub const MAX_PLAUSIBLE_VALUE: f64 = 1000.0;

/// Search patterns
pub const SURFACE_PATTERN: &str = r":(?:TMP|SNOD|PRATE|APCP|.*WRF|RH|ASNOW):surface";
pub const TWO_METRE_PATTERN: &str = r":(?:TMP|RH):2 m";
pub const WIND_PATTERN: &str = r":WIND|GRD:10 m above";

/// Season boundaries (month, day)
pub const SEASON_START: (u32, u32) = (10, 1);
pub const SEASON_END: (u32, u32) = (6, 1);
pub const FORECAST_SEASON_START: (u32, u32) = (12, 1);

/// Parquet defaults
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;
