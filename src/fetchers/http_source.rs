use crate::error::{FetchError, Result};
use crate::fetchers::source::{FetchTask, ObservationSource};
use crate::models::{FetchOutcome, GridPoint, JoinKey, ResultTable, TableRow};
use crate::utils::timestamps::{format_timestamp, timestamp_serde};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Serialize)]
struct FetchRequest<'a> {
    dates: Vec<String>,
    fxx: &'a [u32],
    search: &'a str,
    points: &'a [GridPoint],
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<ResponseRow>,
}

#[derive(Debug, Deserialize)]
struct ResponseRow {
    #[serde(with = "timestamp_serde")]
    valid_time: NaiveDateTime,
    #[serde(with = "timestamp_serde")]
    time: NaiveDateTime,
    /// Forecast step in hours.
    step: i64,
    point_id: u32,
    /// Everything else; only numeric cells of declared columns are kept.
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
}

/// JSON-over-HTTP adapter for the extraction service.
///
/// The service answers `POST {dates, fxx, search, points}` with
/// `{columns, rows}`; `204 No Content` or an empty `rows` array means no data.
pub struct HttpSource {
    client: Client,
    endpoint: String,
}

impl HttpSource {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("hrrr-fetcher/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn into_outcome(pattern: &str, response: FetchResponse) -> FetchOutcome {
        if response.rows.is_empty() {
            return FetchOutcome::Empty {
                pattern: pattern.to_string(),
            };
        }

        let mut table = ResultTable::new(pattern, response.columns);
        for row in response.rows {
            let key = JoinKey {
                valid_time: row.valid_time,
                time: row.time,
                step_hours: row.step,
                point_id: row.point_id,
            };
            let mut table_row = TableRow::new(key);
            for column in &table.columns {
                let value = row.values.get(column).and_then(Value::as_f64);
                table_row.values.insert(column.clone(), value);
            }
            table.push(table_row);
        }
        FetchOutcome::Table(table)
    }
}

#[async_trait]
impl ObservationSource for HttpSource {
    async fn fetch(&self, task: &FetchTask) -> Result<FetchOutcome> {
        let request = FetchRequest {
            dates: task.dates.iter().map(format_timestamp).collect(),
            fxx: &task.fxx,
            search: &task.pattern,
            points: &task.points,
        };

        debug!(pattern = %task.pattern, dates = task.dates.len(), "POST {}", self.endpoint);
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(FetchOutcome::Empty {
                pattern: task.pattern.clone(),
            });
        }

        let response = response.error_for_status().map_err(|e| FetchError::Upstream {
            pattern: task.pattern.clone(),
            message: e.to_string(),
        })?;

        let body = response.bytes().await?;
        let parsed: FetchResponse = serde_json::from_slice(&body)?;
        Ok(Self::into_outcome(&task.pattern, parsed))
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}
