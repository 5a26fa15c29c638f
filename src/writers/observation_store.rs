use crate::error::Result;
use crate::models::{ObservationRecord, RecordKey};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Deduplicate by key and sort by (time, valid_time, fxx, point_id).
///
/// When a key repeats, the record with more non-null variables wins; ties
/// go to the one seen last.
pub fn normalize_records(records: Vec<ObservationRecord>) -> Vec<ObservationRecord> {
    let mut by_key: BTreeMap<RecordKey, ObservationRecord> = BTreeMap::new();
    for record in records {
        match by_key.get(&record.key()) {
            Some(existing) if existing.present_count() > record.present_count() => {}
            _ => {
                by_key.insert(record.key(), record);
            }
        }
    }
    by_key.into_values().collect()
}

/// CSV file holding every persisted record in canonical column order.
///
/// The controller is the only writer; every rewrite goes through a temporary
/// file in the same directory and is renamed into place.
#[derive(Debug, Clone)]
pub struct ObservationStore {
    path: PathBuf,
}

impl ObservationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// All stored records; a store that does not exist yet is empty.
    pub fn load(&self) -> Result<Vec<ObservationRecord>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let mut reader = ReaderBuilder::new().has_headers(true).from_path(&self.path)?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            let record: ObservationRecord = row?;
            records.push(record);
        }

        debug!(rows = records.len(), path = %self.path.display(), "Loaded store");
        Ok(records)
    }

    /// Append rows, writing the header first when the file is new.
    pub fn append(&self, records: &[ObservationRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.ensure_parent()?;

        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let mut writer = WriterBuilder::new().has_headers(needs_header).from_writer(file);
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        Ok(records.len())
    }

    /// Reload, deduplicate, sort and rewrite. Running it twice changes nothing.
    pub fn normalize(&self) -> Result<usize> {
        let records = normalize_records(self.load()?);
        let count = records.len();
        self.replace(&records)?;
        Ok(count)
    }

    /// Atomically replace the whole store.
    pub fn replace(&self, records: &[ObservationRecord]) -> Result<()> {
        self.ensure_parent()?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = WriterBuilder::new().has_headers(true).from_writer(temp.as_file());
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        debug!(rows = records.len(), path = %self.path.display(), "Rewrote store");
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
