pub mod error_log;
pub mod observation_store;
pub mod parquet_writer;
pub mod resume_marker;
pub mod slice_writer;

pub use error_log::ErrorLog;
pub use observation_store::{normalize_records, ObservationStore};
pub use parquet_writer::{ParquetFileInfo, ParquetWriter};
pub use resume_marker::ResumeMarker;
pub use slice_writer::{season_of, SliceFormat, SliceWriter};
