use crate::error::{FetchError, Result};
use crate::models::{ObservationRecord, Variable};
use crate::utils::constants::DEFAULT_ROW_GROUP_SIZE;
use arrow::array::{ArrayRef, Float64Array, TimestampSecondArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "lz4" => Compression::LZ4,
            "zstd" => Compression::ZSTD(ZstdLevel::default()),
            "none" => Compression::UNCOMPRESSED,
            _ => {
                return Err(FetchError::Configuration(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Write records in canonical column order, one row group per `row_group_size` rows.
    pub fn write_records(&self, records: &[ObservationRecord], path: &Path) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let schema = Self::create_schema();
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        for chunk in records.chunks(self.row_group_size.max(1)) {
            let batch = Self::records_to_batch(chunk, schema.clone())?;
            writer.write(&batch)?;
        }
        writer.close()?;

        Ok(())
    }

    fn create_schema() -> Arc<Schema> {
        let timestamp = DataType::Timestamp(TimeUnit::Second, None);
        let mut fields = vec![
            Field::new("time", timestamp.clone(), false),
            Field::new("valid_time", timestamp, false),
            Field::new("fxx", DataType::UInt32, false),
        ];
        for variable in &Variable::ALL[..8] {
            fields.push(Field::new(variable.column_name(), DataType::Float64, true));
        }
        fields.push(Field::new("point_id", DataType::UInt32, false));
        for variable in &Variable::ALL[8..] {
            fields.push(Field::new(variable.column_name(), DataType::Float64, true));
        }

        Arc::new(Schema::new(fields))
    }

    fn records_to_batch(records: &[ObservationRecord], schema: Arc<Schema>) -> Result<RecordBatch> {
        let seconds = |ts: &chrono::NaiveDateTime| ts.and_utc().timestamp();
        let variable_column = |variable: Variable| -> ArrayRef {
            Arc::new(Float64Array::from(
                records.iter().map(|r| r.get(variable)).collect::<Vec<_>>(),
            ))
        };

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampSecondArray::from(
                records.iter().map(|r| seconds(&r.time)).collect::<Vec<_>>(),
            )),
            Arc::new(TimestampSecondArray::from(
                records.iter().map(|r| seconds(&r.valid_time)).collect::<Vec<_>>(),
            )),
            Arc::new(UInt32Array::from(
                records.iter().map(|r| r.fxx).collect::<Vec<_>>(),
            )),
        ];
        columns.extend(Variable::ALL[..8].iter().map(|v| variable_column(*v)));
        columns.push(Arc::new(UInt32Array::from(
            records.iter().map(|r| r.point_id).collect::<Vec<_>>(),
        )));
        columns.extend(Variable::ALL[8..].iter().map(|v| variable_column(*v)));

        Ok(RecordBatch::try_new(schema, columns)?)
    }

    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let row_groups = metadata.num_row_groups();
        let row_group_sizes = (0..row_groups)
            .map(|i| metadata.row_group(i).num_rows())
            .collect();

        Ok(ParquetFileInfo {
            total_rows: metadata.file_metadata().num_rows(),
            columns: metadata.file_metadata().schema_descr().num_columns(),
            row_groups,
            row_group_sizes,
            file_size: std::fs::metadata(path)?.len(),
        })
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub columns: usize,
    pub row_groups: usize,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::CANONICAL_COLUMNS;
    use chrono::{Duration, NaiveDate};
    use tempfile::TempDir;

    fn records(n: i64) -> Vec<ObservationRecord> {
        let start = NaiveDate::from_ymd_opt(2024, 12, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|h| {
                let mut record = ObservationRecord::new(3, start + Duration::hours(h), 1);
                record.t2m = Some(270.0 + h as f64);
                record
            })
            .collect()
    }

    #[test]
    fn test_schema_matches_canonical_order() {
        let schema = ParquetWriter::create_schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, CANONICAL_COLUMNS.to_vec());
    }

    #[test]
    fn test_write_empty_records() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("empty.parquet");
        ParquetWriter::new().write_records(&[], &path)?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_row_groups() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("slice.parquet");
        let writer = ParquetWriter::new().with_row_group_size(10);
        writer.write_records(&records(25), &path)?;

        let info = writer.get_file_info(&path)?;
        assert_eq!(info.total_rows, 25);
        assert_eq!(info.columns, 17);
        assert_eq!(info.row_groups, 3);
        Ok(())
    }

    #[test]
    fn test_different_compressions() -> Result<()> {
        let dir = TempDir::new()?;
        for compression in ["snappy", "gzip", "lz4", "zstd", "none"] {
            let writer = ParquetWriter::new().with_compression(compression)?;
            let path = dir.path().join(format!("{}.parquet", compression));
            let result = writer.write_records(&records(3), &path);
            assert!(result.is_ok(), "Failed with compression: {}", compression);
        }
        assert!(ParquetWriter::new().with_compression("brotli-ish").is_err());
        Ok(())
    }
}
