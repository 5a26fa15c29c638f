use crate::error::{FetchError, Result};
use crate::models::GridPoint;
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::Path;
use validator::Validate;

/// Reads the forecast points file (`id,latitude,longitude` with a header row).
pub struct PointReader {
    trim: bool,
}

impl PointReader {
    pub fn new() -> Self {
        Self { trim: true }
    }

    pub fn with_trim(trim: bool) -> Self {
        Self { trim }
    }

    pub fn read_points(&self, path: &Path) -> Result<Vec<GridPoint>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(if self.trim {
                csv::Trim::All
            } else {
                csv::Trim::None
            })
            .from_path(path)?;

        let mut points = Vec::new();
        let mut seen = HashSet::new();
        for row in reader.deserialize() {
            let point: GridPoint = row?;
            point.validate()?;
            if !seen.insert(point.id) {
                return Err(FetchError::Configuration(format!(
                    "Duplicate point id {} in {}",
                    point.id,
                    path.display()
                )));
            }
            points.push(point);
        }

        if points.is_empty() {
            return Err(FetchError::Configuration(format!(
                "No points found in {}",
                path.display()
            )));
        }

        Ok(points)
    }
}

impl Default for PointReader {
    fn default() -> Self {
        Self::new()
    }
}
