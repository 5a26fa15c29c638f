use crate::config::EngineConfig;
use crate::error::Result;
use crate::fetchers::{FetchExecutor, ObservationSource};
use crate::models::{
    ErrorLogEntry, FailureKind, FetchInterval, GridPoint, IntervalOutcome, IntervalStatus,
    RunSummary,
};
use crate::processors::gap_coalescer::GapCoalescer;
use crate::processors::gap_detector::{GapDetector, GapReport, TimeColumn};
use crate::processors::interpolator::{InterpolationReport, Interpolator};
use crate::processors::interval_planner::{IntervalPlanner, PlanRequest};
use crate::processors::result_merger::ResultMerger;
use crate::utils::constants::{FORECAST_HORIZON_HOURS, FORECAST_SEASON_START, SEASON_START};
use crate::utils::progress::ProgressReporter;
use crate::utils::timestamps::midnight;
use crate::writers::{ErrorLog, ObservationStore, ResumeMarker};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const STILL_MISSING_MESSAGE: &str = "still missing data after retry";

/// What a `refetch` run did, stage by stage.
#[derive(Debug, Default)]
pub struct RefetchReport {
    pub logged: RunSummary,
    pub still_missing: usize,
    pub gaps: GapReport,
    pub gap_fetches: RunSummary,
    pub interpolation: InterpolationReport,
    pub rows_after: usize,
}

impl RefetchReport {
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("=== Refetch Summary ===\n");
        summary.push_str(&format!(
            "Logged intervals retried: {} ({} persisted)\n",
            self.logged.outcomes.len(),
            self.logged.persisted()
        ));
        summary.push_str(&format!("Still missing after retry: {}\n", self.still_missing));
        summary.push_str(&format!("Missing hours in store: {}\n", self.gaps.missing().len()));
        summary.push_str(&format!(
            "Gap ranges fetched: {} ({} persisted)\n",
            self.gap_fetches.outcomes.len(),
            self.gap_fetches.persisted()
        ));
        summary.push_str(&format!(
            "Interpolated rows: {} ({} skipped)\n",
            self.interpolation.synthesized,
            self.interpolation.skipped.len()
        ));
        summary.push_str(&format!("Rows in store: {}\n", self.rows_after));
        summary
    }
}

/// Drives intervals through fetch, merge and persistence, and the recovery
/// flows built on top of it. Intervals run strictly one after another and
/// this is the only writer of the store, error log and resume marker.
pub struct FetchPipeline {
    config: EngineConfig,
    executor: FetchExecutor,
    merger: ResultMerger,
    planner: IntervalPlanner,
    detector: GapDetector,
    coalescer: GapCoalescer,
    store: ObservationStore,
    error_log: ErrorLog,
    resume_marker: ResumeMarker,
    points: Arc<Vec<GridPoint>>,
    quiet: bool,
}

impl FetchPipeline {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn ObservationSource>,
        points: Vec<GridPoint>,
    ) -> Self {
        Self {
            executor: FetchExecutor::new(source, &config),
            merger: ResultMerger::new(config.merge.wide_column_threshold),
            planner: IntervalPlanner::new(config.gaps.excluded_months.clone()),
            detector: GapDetector::new(config.gaps.excluded_months.clone()),
            coalescer: GapCoalescer::new(config.max_range()),
            store: ObservationStore::new(config.store_path()),
            error_log: ErrorLog::new(&config.store.error_log),
            resume_marker: ResumeMarker::new(&config.store.resume_marker),
            points: Arc::new(points),
            quiet: false,
            config,
        }
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    pub fn resume_marker(&self) -> &ResumeMarker {
        &self.resume_marker
    }

    /// Plan `request` against `now` and fetch every interval with the configured leads.
    pub async fn fetch_data(&self, request: &PlanRequest, now: NaiveDateTime) -> Result<RunSummary> {
        let intervals = self.planner.plan(request, now)?;
        info!(intervals = intervals.len(), "Fetching planned intervals");
        let fxx = self.config.fetch.fxx.clone();
        self.run_intervals(&intervals, &fxx).await
    }

    /// Process intervals in order. Interval-scoped failures are logged and
    /// recorded in the summary; only fatal errors stop the run.
    pub async fn run_intervals(
        &self,
        intervals: &[FetchInterval],
        fxx: &[u32],
    ) -> Result<RunSummary> {
        let progress =
            ProgressReporter::new(intervals.len() as u64, "Fetching intervals", self.quiet);
        let mut summary = RunSummary::default();

        for interval in intervals {
            progress.set_message(&format!("Fetching {}", interval));

            let status = match self.process_interval(interval, fxx).await {
                Ok(rows) => {
                    info!(%interval, rows, "Persisted interval");
                    // Rows are already in the store; only warn from here on
                    if let Err(e) = self.settle_interval(interval) {
                        warn!(%interval, error = %e, "Store maintenance failed after append");
                    }
                    IntervalStatus::Persisted { rows }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(%interval, error = %e, "Interval failed, not saving data");
                    let entry = ErrorLogEntry::from_error(now_local(), *interval, &e);
                    self.error_log.append(&entry)?;
                    IntervalStatus::Failed(entry)
                }
            };

            summary.outcomes.push(IntervalOutcome {
                interval: *interval,
                status,
            });
            progress.increment(1);
        }

        progress.finish_with_message(&format!(
            "Fetched {} of {} intervals",
            summary.persisted(),
            intervals.len()
        ));
        Ok(summary)
    }

    async fn process_interval(&self, interval: &FetchInterval, fxx: &[u32]) -> Result<usize> {
        let tables = self
            .executor
            .run(interval, &self.config.fetch.patterns, &self.points, fxx)
            .await?;
        let records = self.merger.merge(tables)?;

        self.store.append(&records)
    }

    /// Normalize the store and advance the resume marker past `interval`.
    fn settle_interval(&self, interval: &FetchInterval) -> Result<()> {
        let total = self.store.normalize()?;
        debug!(%interval, total, "Store normalized");
        self.resume_marker.write(interval.end)
    }

    /// Retry every logged interval, then fill the remaining gaps in the store
    /// by range re-fetch and, failing that, interpolation.
    pub async fn refetch_data(&self) -> Result<RefetchReport> {
        let mut report = RefetchReport::default();

        let entries = self.error_log.read_entries()?;
        if !entries.is_empty() {
            let intervals: Vec<FetchInterval> = entries.iter().map(|e| e.interval).collect();
            info!(intervals = intervals.len(), "Retrying logged intervals");
            report.logged = self.run_intervals(&intervals, &self.config.fetch.fxx).await?;
        }

        // Keep only entries whose hours are still not fully stored
        let records = self.store.load()?;
        let logged_at = now_local();
        let still_missing: Vec<ErrorLogEntry> = entries
            .iter()
            .filter(|entry| {
                let hours = entry.interval.hours();
                match (hours.first(), hours.last()) {
                    (Some(first), Some(last)) => !self
                        .detector
                        .scan(&records, *first, *last, TimeColumn::Time)
                        .is_clean(),
                    _ => false,
                }
            })
            .map(|entry| {
                ErrorLogEntry::new(
                    logged_at,
                    entry.interval,
                    FailureKind::StillMissing,
                    STILL_MISSING_MESSAGE,
                )
            })
            .collect();
        report.still_missing = still_missing.len();
        self.error_log.rewrite(&still_missing)?;

        let Some((min, max)) = time_span(&records, TimeColumn::Time) else {
            info!("Store is empty, nothing to reconcile");
            return Ok(report);
        };

        report.gaps = self.detector.scan(&records, min, max, TimeColumn::Time);
        let missing = report.gaps.missing();
        if missing.is_empty() {
            info!(path = %self.store.path().display(), "No missing hours found");
            report.rows_after = records.len();
            return Ok(report);
        }
        info!(hours = missing.len(), "Found hours missing or holding nulls");

        let ranges = self.coalescer.coalesce_intervals(&missing);
        report.gap_fetches = self.run_intervals(&ranges, &self.config.fetch.fxx).await?;

        // Whatever is still missing gets interpolated
        let records = self.store.load()?;
        let remaining = self.detector.scan(&records, min, max, TimeColumn::Time).missing();
        let (records, interpolation) = Interpolator::new().fill(records, &remaining);
        self.store.replace(&records)?;

        report.interpolation = interpolation;
        report.rows_after = records.len();
        Ok(report)
    }

    /// Fill gaps in a season that starts on Oct 1 of `season`, up to `day`.
    /// Returns whether anything was fetched.
    pub async fn recover_season(&self, season: i32, day: NaiveDate) -> Result<bool> {
        let Some(season_start) = season_start(season, SEASON_START) else {
            return Ok(false);
        };
        let end = midnight(day);

        let Some(missing) = self.find_missing(season_start, end, end, TimeColumn::Time)? else {
            return Ok(false);
        };

        let ranges = self.coalescer.coalesce_intervals(&missing);
        self.run_intervals(&ranges, &self.config.fetch.fxx).await?;
        Ok(true)
    }

    /// Fill gaps in the forecast store for the season starting Dec 1 of `season`,
    /// through the end of `day`. Every hour is fetched from its day's 00:00 run.
    pub async fn recover_forecast(&self, season: i32, day: NaiveDate) -> Result<bool> {
        let Some(season_start) = season_start(season, FORECAST_SEASON_START) else {
            return Ok(false);
        };
        let shortcut_end = midnight(day);
        let scan_end = shortcut_end + Duration::days(1);

        let Some(missing) =
            self.find_missing(season_start, shortcut_end, scan_end, TimeColumn::ValidTime)?
        else {
            return Ok(false);
        };

        for (run, fxx) in forecast_requests(&self.coalescer.coalesce(&missing)) {
            let interval = FetchInterval::inclusive(run, run);
            self.run_intervals(&[interval], &fxx).await?;
        }
        Ok(true)
    }

    /// Missing hours in `[scan_start, scan_end]`, or `None` when every point
    /// already has the expected row count or nothing is missing.
    fn find_missing(
        &self,
        scan_start: NaiveDateTime,
        shortcut_end: NaiveDateTime,
        scan_end: NaiveDateTime,
        column: TimeColumn,
    ) -> Result<Option<Vec<NaiveDateTime>>> {
        let records = crate::writers::normalize_records(self.store.load()?);
        let Some((min, _)) = time_span(&records, column) else {
            warn!("Store is empty, nothing to recover");
            return Ok(None);
        };

        let deviating = self.detector.check_points(&records, min, shortcut_end);
        if deviating.is_empty() {
            info!("Every point has the expected row count");
            return Ok(None);
        }
        debug!(points = deviating.len(), "Points with unexpected row counts");

        let missing = self
            .detector
            .scan(&records, scan_start, scan_end, column)
            .missing();
        if missing.is_empty() {
            info!("No missing hours found");
            return Ok(None);
        }

        info!(hours = missing.len(), "Found missing hours");
        Ok(Some(missing))
    }
}

fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn season_start(season: i32, (month, day): (u32, u32)) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(season, month, day).map(midnight)
}

fn time_span(
    records: &[crate::models::ObservationRecord],
    column: TimeColumn,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let min = records.iter().map(|r| column.of(r)).min()?;
    let max = records.iter().map(|r| column.of(r)).max()?;
    Some((min, max))
}

/// The 00:00 run and lead that produce valid hour `hour`.
/// Midnight belongs to the previous day's run at the full horizon.
pub fn forecast_run(hour: NaiveDateTime) -> (NaiveDateTime, u32) {
    if hour.hour() == 0 {
        (
            midnight(hour.date()) - Duration::days(1),
            FORECAST_HORIZON_HOURS as u32,
        )
    } else {
        (midnight(hour.date()), hour.hour())
    }
}

/// Split coalesced valid-time ranges per run, each with the lead range covering its hours.
pub fn forecast_requests(ranges: &[(NaiveDateTime, NaiveDateTime)]) -> Vec<(NaiveDateTime, Vec<u32>)> {
    let mut requests = Vec::new();

    for (start, end) in ranges {
        let mut per_run: BTreeMap<NaiveDateTime, (u32, u32)> = BTreeMap::new();
        let mut hour = *start;
        while hour <= *end {
            let (run, fxx) = forecast_run(hour);
            let span = per_run.entry(run).or_insert((fxx, fxx));
            span.0 = span.0.min(fxx);
            span.1 = span.1.max(fxx);
            hour += Duration::hours(1);
        }

        requests.extend(
            per_run
                .into_iter()
                .map(|(run, (low, high))| (run, (low..=high).collect())),
        );
    }

    requests
}
