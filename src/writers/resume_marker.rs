use crate::error::Result;
use crate::utils::constants::LOG_TIMESTAMP_FORMAT;
use crate::utils::timestamps::parse_timestamp;
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Single-line file holding the end of the last interval that was persisted.
#[derive(Debug, Clone)]
pub struct ResumeMarker {
    path: PathBuf,
}

impl ResumeMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, completed: NaiveDateTime) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, completed.format(LOG_TIMESTAMP_FORMAT).to_string())?;
        Ok(())
    }

    pub fn read(&self) -> Result<Option<NaiveDateTime>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        match contents.lines().next().map(str::trim) {
            Some(line) if !line.is_empty() => Ok(Some(parse_timestamp(line)?)),
            _ => Ok(None),
        }
    }
}
