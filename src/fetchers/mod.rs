pub mod executor;
pub mod http_source;
pub mod source;

pub use executor::FetchExecutor;
pub use http_source::HttpSource;
pub use source::{FetchTask, ObservationSource};
