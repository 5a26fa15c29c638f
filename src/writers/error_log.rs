use crate::error::{FetchError, Result};
use crate::models::{ErrorLogEntry, FailureKind, FetchInterval};
use crate::utils::constants::LOG_TIMESTAMP_FORMAT;
use crate::utils::timestamps::{format_timestamp, parse_timestamp};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Append-only log of failed intervals: `logged_at,start,end,message`, no header.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &ErrorLogEntry) -> Result<()> {
        self.ensure_parent()?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(to_fields(entry))?;
        writer.flush()?;
        Ok(())
    }

    /// Every parseable entry. Unreadable lines are skipped with a warning.
    pub fn read_entries(&self) -> Result<Vec<ErrorLogEntry>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut entries = Vec::new();
        for (line, row) in reader.records().enumerate() {
            match row.map_err(FetchError::from).and_then(|r| from_fields(&r)) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = line + 1, error = %e, "Skipping unreadable error log line"),
            }
        }

        debug!(entries = entries.len(), "Read error log");
        Ok(entries)
    }

    /// Replace the log with `entries`, removing the file when none are left.
    pub fn rewrite(&self, entries: &[ErrorLogEntry]) -> Result<()> {
        if entries.is_empty() {
            if self.path.is_file() {
                fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        self.ensure_parent()?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = WriterBuilder::new()
                .has_headers(false)
                .from_writer(temp.as_file());
            for entry in entries {
                writer.write_record(to_fields(entry))?;
            }
            writer.flush()?;
        }
        temp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn to_fields(entry: &ErrorLogEntry) -> [String; 4] {
    [
        entry.logged_at.format(LOG_TIMESTAMP_FORMAT).to_string(),
        format_timestamp(&entry.interval.start),
        format_timestamp(&entry.interval.end),
        entry.message.clone(),
    ]
}

fn from_fields(record: &StringRecord) -> Result<ErrorLogEntry> {
    if record.len() < 4 {
        return Err(FetchError::InvalidFormat(format!(
            "expected 4 fields, found {}",
            record.len()
        )));
    }

    let logged_at = parse_timestamp(&record[0])?;
    let start = parse_timestamp(&record[1])?;
    let end = parse_timestamp(&record[2])?;
    // Unquoted commas in hand-edited lines end up as extra fields
    let message = record.iter().skip(3).collect::<Vec<_>>().join(",");

    Ok(ErrorLogEntry::new(
        logged_at,
        FetchInterval::inclusive(start, end),
        FailureKind::from_message(&message),
        message,
    ))
}
