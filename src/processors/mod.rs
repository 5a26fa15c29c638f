pub mod gap_coalescer;
pub mod gap_detector;
pub mod interpolator;
pub mod interval_planner;
pub mod outlier_filter;
pub mod pipeline;
pub mod result_merger;

pub use gap_coalescer::GapCoalescer;
pub use gap_detector::{GapDetector, GapReport, PointCompleteness, TimeColumn};
pub use interpolator::{InterpolationReport, Interpolator};
pub use interval_planner::{IntervalPlanner, PlanRequest};
pub use outlier_filter::{OutlierFilter, OutlierReport};
pub use pipeline::{forecast_requests, forecast_run, FetchPipeline, RefetchReport};
pub use result_merger::ResultMerger;
