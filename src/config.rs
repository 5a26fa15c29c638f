//! Engine configuration.
//!
//! Built once per run from built-in defaults, an optional TOML file and
//! `HRRR_`-prefixed environment variables (`HRRR_FETCH__COLLECT_TIMEOUT_SECS=90`),
//! then passed by reference to every component.

use crate::error::Result;
use crate::utils::constants::*;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    #[validate(nested)]
    pub store: StoreConfig,
    #[validate(nested)]
    pub fetch: FetchConfig,
    #[validate(nested)]
    pub merge: MergeConfig,
    #[validate(nested)]
    pub gaps: GapConfig,
    #[validate(nested)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StoreConfig {
    pub output_dir: PathBuf,
    #[validate(length(min = 1))]
    pub output_file: String,
    pub error_log: PathBuf,
    pub resume_marker: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FetchConfig {
    #[validate(length(min = 1, message = "at least one search pattern is required"))]
    pub patterns: Vec<String>,
    #[validate(length(min = 1, message = "at least one forecast lead is required"))]
    pub fxx: Vec<u32>,
    #[validate(range(min = 1))]
    pub collect_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub join_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub wide_pattern_len: usize,
    #[validate(url)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MergeConfig {
    #[validate(range(min = 1))]
    pub wide_column_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GapConfig {
    #[validate(custom(function = "validate_months"))]
    pub excluded_months: Vec<u32>,
    #[validate(range(min = 1))]
    pub max_range_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IngestConfig {
    pub sentinels: Vec<f64>,
    pub plausible_min: f64,
    pub plausible_max: f64,
}

#[allow(clippy::ptr_arg)]
fn validate_months(months: &Vec<u32>) -> std::result::Result<(), ValidationError> {
    if months.iter().all(|m| (1..=12).contains(m)) {
        Ok(())
    } else {
        Err(ValidationError::new("month_out_of_range"))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            error_log: PathBuf::from(DEFAULT_ERROR_LOG),
            resume_marker: PathBuf::from(DEFAULT_RESUME_MARKER),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                SURFACE_PATTERN.to_string(),
                TWO_METRE_PATTERN.to_string(),
                WIND_PATTERN.to_string(),
            ],
            fxx: vec![1],
            collect_timeout_secs: DEFAULT_COLLECT_TIMEOUT_SECS,
            join_timeout_secs: DEFAULT_JOIN_TIMEOUT_SECS,
            wide_pattern_len: DEFAULT_WIDE_PATTERN_LEN,
            endpoint: None,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            wide_column_threshold: DEFAULT_WIDE_COLUMN_THRESHOLD,
        }
    }
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            excluded_months: DEFAULT_EXCLUDED_MONTHS.to_vec(),
            max_range_hours: DEFAULT_MAX_RANGE_HOURS,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sentinels: DEFAULT_SENTINELS.to_vec(),
            plausible_min: MIN_PLAUSIBLE_VALUE,
            plausible_max: MAX_PLAUSIBLE_VALUE,
        }
    }
}

impl EngineConfig {
    /// Layer defaults, an optional file and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&EngineConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("HRRR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn store_path(&self) -> PathBuf {
        self.store.output_dir.join(&self.store.output_file)
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.collect_timeout_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.join_timeout_secs)
    }

    pub fn max_range(&self) -> chrono::Duration {
        chrono::Duration::hours(self.gaps.max_range_hours)
    }
}
