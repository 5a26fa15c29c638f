use crate::error::Result;
use crate::models::{FetchInterval, FetchOutcome, GridPoint};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;

/// One (interval, pattern, points, fxx) unit of work.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub id: usize,
    pub interval: FetchInterval,
    /// Hourly run times requested upstream; a subset of the interval when split.
    pub dates: Vec<NaiveDateTime>,
    pub pattern: String,
    pub points: Arc<Vec<GridPoint>>,
    pub fxx: Vec<u32>,
}

/// Upstream time-series source. Implementations must return
/// [`FetchOutcome::Empty`] rather than an empty table when nothing matched.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(&self, task: &FetchTask) -> Result<FetchOutcome>;

    fn name(&self) -> &str {
        "upstream"
    }
}
