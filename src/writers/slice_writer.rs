use crate::error::{FetchError, Result};
use crate::models::ObservationRecord;
use crate::utils::constants::{SEASON_END, SEASON_START};
use crate::writers::parquet_writer::ParquetWriter;
use chrono::Datelike;
use csv::WriterBuilder;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SliceFormat {
    #[default]
    Csv,
    Parquet,
}

impl SliceFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SliceFormat::Csv => "csv",
            SliceFormat::Parquet => "parquet",
        }
    }
}

impl std::str::FromStr for SliceFormat {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(SliceFormat::Csv),
            "parquet" => Ok(SliceFormat::Parquet),
            other => Err(FetchError::Configuration(format!(
                "Unsupported export format: {}",
                other
            ))),
        }
    }
}

/// Season a timestamp belongs to, named by the year it starts in.
/// Summer months between the end and the next start have none.
pub fn season_of(record: &ObservationRecord) -> Option<i32> {
    let date = record.time.date();
    let month_day = (date.month(), date.day());
    if month_day >= SEASON_START {
        Some(date.year())
    } else if month_day < SEASON_END {
        Some(date.year() - 1)
    } else {
        None
    }
}

/// Writes one file per (point, fxx) for the downstream consumer.
pub struct SliceWriter {
    output_dir: PathBuf,
    format: SliceFormat,
    split_by_season: bool,
    compression: String,
}

impl SliceWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            format: SliceFormat::default(),
            split_by_season: false,
            compression: "snappy".to_string(),
        }
    }

    pub fn with_format(mut self, format: SliceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_season_split(mut self, split: bool) -> Self {
        self.split_by_season = split;
        self
    }

    pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = compression.into();
        self
    }

    /// Write every slice in parallel. Returns the written paths, sorted.
    pub fn write(&self, records: &[ObservationRecord]) -> Result<Vec<PathBuf>> {
        self.prepare_output_dir()?;

        let mut slices: BTreeMap<(u32, u32), Vec<&ObservationRecord>> = BTreeMap::new();
        for record in records {
            slices
                .entry((record.point_id, record.fxx))
                .or_default()
                .push(record);
        }

        debug!(slices = slices.len(), dir = %self.output_dir.display(), "Exporting slices");

        let written: Vec<Vec<PathBuf>> = slices
            .into_par_iter()
            .map(|((point_id, fxx), rows)| {
                let mut rows: Vec<ObservationRecord> = rows.into_iter().cloned().collect();
                rows.sort_by_key(|r| (r.time, r.valid_time));
                if self.split_by_season {
                    self.write_seasons(point_id, fxx, rows)
                } else {
                    let path = self.output_dir.join(format!(
                        "weather_p{}_fxx{}.{}",
                        point_id,
                        fxx,
                        self.format.extension()
                    ));
                    self.write_file(&rows, &path)?;
                    Ok(vec![path])
                }
            })
            .collect::<Result<_>>()?;

        let mut paths: Vec<PathBuf> = written.into_iter().flatten().collect();
        paths.sort();
        info!(files = paths.len(), "Export complete");
        Ok(paths)
    }

    fn write_seasons(
        &self,
        point_id: u32,
        fxx: u32,
        rows: Vec<ObservationRecord>,
    ) -> Result<Vec<PathBuf>> {
        let mut seasons: BTreeMap<i32, Vec<ObservationRecord>> = BTreeMap::new();
        for row in rows {
            if let Some(season) = season_of(&row) {
                seasons.entry(season).or_default().push(row);
            }
        }

        let (Some(first), Some(last)) = (
            seasons.keys().next().copied(),
            seasons.keys().next_back().copied(),
        ) else {
            return Ok(Vec::new());
        };

        let dir = self
            .output_dir
            .join(format!("weather_{}-{}_p{}_fxx{}", first, last, point_id, fxx));
        fs::create_dir_all(&dir)?;

        let mut paths = Vec::with_capacity(seasons.len());
        for (season, rows) in seasons {
            let path = dir.join(format!(
                "weather_{}_p{}_fxx{}.{}",
                season,
                point_id,
                fxx,
                self.format.extension()
            ));
            self.write_file(&rows, &path)?;
            paths.push(path);
        }
        Ok(paths)
    }

    fn write_file(&self, rows: &[ObservationRecord], path: &Path) -> Result<()> {
        match self.format {
            SliceFormat::Csv => {
                let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
                for row in rows {
                    writer.serialize(row)?;
                }
                writer.flush()?;
            }
            SliceFormat::Parquet => {
                ParquetWriter::new()
                    .with_compression(&self.compression)?
                    .write_records(rows, path)?;
            }
        }
        Ok(())
    }

    fn prepare_output_dir(&self) -> Result<()> {
        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(FetchError::NotADirectory(self.output_dir.clone()));
        }
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }
}
