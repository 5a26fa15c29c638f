use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use hrrr_fetcher::config::EngineConfig;
use hrrr_fetcher::error::{FetchError, Result};
use hrrr_fetcher::fetchers::{FetchTask, ObservationSource};
use hrrr_fetcher::models::{
    FailureKind, FetchInterval, FetchOutcome, GridPoint, JoinKey, ObservationRecord, ResultTable,
    TableRow, Variable,
};
use hrrr_fetcher::processors::{FetchPipeline, PlanRequest};
use hrrr_fetcher::writers::{ObservationStore, ParquetWriter, SliceFormat, SliceWriter};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn complete_record(point_id: u32, time: NaiveDateTime, value: f64) -> ObservationRecord {
    forecast_record(point_id, time, 1, value)
}

fn forecast_record(point_id: u32, run: NaiveDateTime, fxx: u32, value: f64) -> ObservationRecord {
    let mut record = ObservationRecord::new(point_id, run, fxx);
    for variable in Variable::ALL {
        record.set(variable, Some(value));
    }
    record
}

/// Answers every task with a complete table, except for intervals whose first
/// hour is in `hang_from` (never answers) or when `fail` is set.
struct MockSource {
    hang_from: Mutex<HashSet<NaiveDateTime>>,
    fail: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Vec<NaiveDateTime>, Vec<u32>)>>,
}

impl MockSource {
    fn new() -> Self {
        Self {
            hang_from: Mutex::new(HashSet::new()),
            fail: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn hang_on(self, start: NaiveDateTime) -> Self {
        self.hang_from.lock().unwrap().insert(start);
        self
    }

    fn release(&self) {
        self.hang_from.lock().unwrap().clear();
    }
}

#[async_trait]
impl ObservationSource for MockSource {
    async fn fetch(&self, task: &FetchTask) -> Result<FetchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((task.dates.clone(), task.fxx.clone()));

        if self.fail {
            return Err(FetchError::InvalidFormat("service unavailable".into()));
        }
        let hangs = task
            .dates
            .first()
            .map_or(false, |first| self.hang_from.lock().unwrap().contains(first));
        if hangs {
            std::future::pending::<()>().await;
        }

        let columns: Vec<String> = Variable::ALL
            .iter()
            .map(|v| v.column_name().to_string())
            .collect();
        let mut table = ResultTable::new(task.pattern.clone(), columns.clone());
        for date in &task.dates {
            for fxx in &task.fxx {
                for point in task.points.iter() {
                    let key = JoinKey {
                        valid_time: *date + Duration::hours(i64::from(*fxx)),
                        time: *date,
                        step_hours: i64::from(*fxx),
                        point_id: point.id,
                    };
                    let mut row = TableRow::new(key);
                    for column in &columns {
                        row = row.with_value(column, Some(2.5));
                    }
                    table.push(row);
                }
            }
        }
        Ok(FetchOutcome::Table(table))
    }
}

fn test_config(dir: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.store.output_dir = dir.path().join("data");
    config.store.error_log = dir.path().join("logs/fetch_error_log.txt");
    config.store.resume_marker = dir.path().join("logs/date_log.txt");
    config.fetch.patterns = vec![":TMP:2 m".to_string()];
    config
}

fn pipeline(dir: &TempDir, source: Arc<MockSource>) -> FetchPipeline {
    pipeline_with(test_config(dir), source, vec![GridPoint::new(1, 48.46, -114.21)])
}

fn pipeline_with(
    config: EngineConfig,
    source: Arc<MockSource>,
    points: Vec<GridPoint>,
) -> FetchPipeline {
    FetchPipeline::new(config, source, points).with_quiet(true)
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_interval_is_logged_and_later_interval_persists() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let source = Arc::new(MockSource::new().hang_on(at(1, 0)));
    let pipeline = pipeline(&dir, source);

    let request = PlanRequest::explicit(vec![
        FetchInterval::half_open(at(1, 0), at(1, 6)),
        FetchInterval::half_open(at(1, 6), at(1, 12)),
    ]);
    let summary = pipeline.fetch_data(&request, at(20, 0)).await.unwrap();

    assert_eq!(summary.persisted(), 1);
    assert_eq!(summary.failed(), 1);

    let records = pipeline.store().load().unwrap();
    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.is_complete()));
    assert!(records.iter().all(|r| r.time >= at(1, 6) && r.time < at(1, 12)));

    let entries = pipeline.error_log().read_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].interval.start, at(1, 0));
    assert_eq!(entries[0].interval.end, at(1, 6));
    assert_eq!(entries[0].kind, FailureKind::Timeout);

    assert_eq!(pipeline.resume_marker().read().unwrap(), Some(at(1, 12)));
}

#[tokio::test(start_paused = true)]
async fn test_refetch_recovers_logged_interval() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let source = Arc::new(MockSource::new().hang_on(at(1, 0)));
    let pipeline = pipeline(&dir, source.clone());

    let request = PlanRequest::explicit(vec![
        FetchInterval::half_open(at(1, 0), at(1, 6)),
        FetchInterval::half_open(at(1, 6), at(1, 12)),
    ]);
    pipeline.fetch_data(&request, at(20, 0)).await.unwrap();

    source.release();
    let report = pipeline.refetch_data().await.unwrap();

    assert_eq!(report.logged.persisted(), 1);
    assert_eq!(report.still_missing, 0);
    assert!(report.gaps.is_clean());
    assert_eq!(report.rows_after, 12);

    // Nothing left to retry
    assert!(pipeline.error_log().read_entries().unwrap().is_empty());
    assert!(!pipeline.error_log().path().exists());

    let records = pipeline.store().load().unwrap();
    let hours: Vec<_> = records.iter().map(|r| r.time).collect();
    assert_eq!(hours, (0..12).map(|h| at(1, h)).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_refetch_interpolates_when_upstream_stays_down() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let source = Arc::new(MockSource::failing());
    let pipeline = pipeline(&dir, source.clone());

    let seeded = vec![
        complete_record(1, at(1, 0), 1.0),
        complete_record(1, at(1, 1), 2.0),
        complete_record(1, at(1, 3), 4.0),
    ];
    pipeline.store().append(&seeded).unwrap();

    let report = pipeline.refetch_data().await.unwrap();

    assert_eq!(report.gaps.missing(), vec![at(1, 2)]);
    assert_eq!(report.gap_fetches.failed(), 1);
    assert_eq!(report.interpolation.synthesized, 1);
    assert_eq!(report.rows_after, 4);
    assert!(source.calls.load(Ordering::SeqCst) >= 1);

    let records = pipeline.store().load().unwrap();
    let filled = records.iter().find(|r| r.time == at(1, 2)).unwrap();
    assert_eq!(filled.t2m, Some(3.0));
    assert!(filled.is_complete());

    // The failed gap fetch stays logged for the next run
    let entries = pipeline.error_log().read_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].interval.start, at(1, 2));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_fetch_leaves_store_unchanged() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let pipeline = pipeline(&dir, Arc::new(MockSource::new()));
    let request = PlanRequest::explicit(vec![FetchInterval::half_open(at(2, 0), at(2, 6))]);

    pipeline.fetch_data(&request, at(20, 0)).await.unwrap();
    let first = std::fs::read(pipeline.store().path()).unwrap();

    pipeline.fetch_data(&request, at(20, 0)).await.unwrap();
    let second = std::fs::read(pipeline.store().path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(pipeline.store().load().unwrap().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_recover_season_fills_missing_hours() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let source = Arc::new(MockSource::new());
    let pipeline = pipeline(&dir, source.clone());

    let oct = |d: u32, h: u32| {
        NaiveDate::from_ymd_opt(2024, 10, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    };
    let seeded: Vec<_> = (0..24)
        .filter(|h| *h != 5)
        .map(|h| complete_record(1, oct(1, h), 1.0))
        .collect();
    pipeline.store().append(&seeded).unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 10, 2).unwrap();
    assert!(pipeline.recover_season(2024, day).await.unwrap());

    let hours: HashSet<_> = pipeline
        .store()
        .load()
        .unwrap()
        .iter()
        .map(|r| r.time)
        .collect();
    assert!(hours.contains(&oct(1, 5)));
    assert!(hours.contains(&oct(2, 0)));

    // Already complete: nothing is fetched the second time
    let calls = source.calls.load(Ordering::SeqCst);
    assert!(!pipeline.recover_season(2024, day).await.unwrap());
    assert_eq!(source.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test(start_paused = true)]
async fn test_recover_forecast_fetches_only_the_missing_lead() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let source = Arc::new(MockSource::new());
    let points = vec![
        GridPoint::new(1, 48.46, -114.21),
        GridPoint::new(2, 48.70, -113.80),
    ];
    let pipeline = pipeline_with(test_config(&dir), source.clone(), points);

    let dec = |d: u32| {
        NaiveDate::from_ymd_opt(2024, 12, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    };
    let nov30 = dec(1) - Duration::days(1);

    // Valid hours Dec 1 00:00 through Dec 2 00:00; point 1 lacks valid hour 05:00
    let mut seeded = Vec::new();
    for point_id in [1, 2] {
        seeded.push(forecast_record(point_id, nov30, 24, 1.0));
        for fxx in 1..=24 {
            if point_id == 1 && fxx == 5 {
                continue;
            }
            seeded.push(forecast_record(point_id, dec(1), fxx, 1.0));
        }
    }
    pipeline.store().append(&seeded).unwrap();

    assert!(pipeline.recover_forecast(2024, dec(1).date()).await.unwrap());

    let requests = source.requests.lock().unwrap().clone();
    assert_eq!(requests, vec![(vec![dec(1)], vec![5])]);

    let records = pipeline.store().load().unwrap();
    let filled = records
        .iter()
        .find(|r| r.point_id == 1 && r.valid_time == dec(1) + Duration::hours(5))
        .unwrap();
    assert_eq!(filled.fxx, 5);
    assert_eq!(filled.time, dec(1));

    // Complete now: the source is not called again
    let calls = source.calls.load(Ordering::SeqCst);
    assert!(!pipeline.recover_forecast(2024, dec(1).date()).await.unwrap());
    assert_eq!(source.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test(start_paused = true)]
async fn test_failed_marker_write_keeps_interval_persisted() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut config = test_config(&dir);
    // A directory cannot be written as the marker file
    config.store.resume_marker = dir.path().to_path_buf();
    let pipeline = pipeline_with(
        config,
        Arc::new(MockSource::new()),
        vec![GridPoint::new(1, 48.46, -114.21)],
    );

    let request = PlanRequest::explicit(vec![FetchInterval::half_open(at(3, 0), at(3, 6))]);
    let summary = pipeline.fetch_data(&request, at(20, 0)).await.unwrap();

    assert_eq!(summary.persisted(), 1);
    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.rows_written(), 6);
    assert!(pipeline.error_log().read_entries().unwrap().is_empty());
    assert_eq!(pipeline.store().load().unwrap().len(), 6);
}

#[test]
fn test_store_export_to_parquet_slices() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = ObservationStore::new(dir.path().join("weather.csv"));
    let records: Vec<_> = (0..6)
        .flat_map(|h| [complete_record(1, at(1, h), 1.0), complete_record(2, at(1, h), 2.0)])
        .collect();
    store.append(&records).unwrap();

    let out = dir.path().join("slices");
    let paths = SliceWriter::new(&out)
        .with_format(SliceFormat::Parquet)
        .write(&store.load().unwrap())
        .unwrap();
    assert_eq!(paths.len(), 2);

    let info = ParquetWriter::new().get_file_info(&paths[0]).unwrap();
    assert_eq!(info.total_rows, 6);
    assert_eq!(info.columns, 17);
}
