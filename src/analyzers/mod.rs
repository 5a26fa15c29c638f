pub mod store_analyzer;

pub use store_analyzer::{StoreAnalyzer, StoreStatistics};
