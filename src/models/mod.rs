pub mod interval;
pub mod observation;
pub mod outcome;
pub mod point;
pub mod table;

pub use interval::{Boundary, FetchInterval};
pub use observation::{ObservationRecord, RecordKey, Variable};
pub use outcome::{ErrorLogEntry, FailureKind, IntervalOutcome, IntervalStatus, RunSummary};
pub use point::GridPoint;
pub use table::{FetchOutcome, JoinKey, ResultTable, TableRow};
