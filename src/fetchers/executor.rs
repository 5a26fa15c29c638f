use crate::config::EngineConfig;
use crate::error::{FetchError, Result};
use crate::fetchers::source::{FetchTask, ObservationSource};
use crate::models::{FetchInterval, FetchOutcome, GridPoint, ResultTable};
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

type TaskReport = (usize, Result<FetchOutcome>);

/// Runs every fetch task of an interval concurrently under a two-tier deadline.
///
/// Results are collected until the collect deadline; afterwards each worker is
/// given the join deadline to finish and is detached if it has not.
pub struct FetchExecutor {
    source: Arc<dyn ObservationSource>,
    collect_timeout: Duration,
    join_timeout: Duration,
    wide_pattern_len: usize,
    sentinels: Vec<f64>,
}

impl FetchExecutor {
    pub fn new(source: Arc<dyn ObservationSource>, config: &EngineConfig) -> Self {
        Self {
            source,
            collect_timeout: config.collect_timeout(),
            join_timeout: config.join_timeout(),
            wide_pattern_len: config.fetch.wide_pattern_len,
            sentinels: config.ingest.sentinels.clone(),
        }
    }

    pub fn with_timeouts(mut self, collect_timeout: Duration, join_timeout: Duration) -> Self {
        self.collect_timeout = collect_timeout;
        self.join_timeout = join_timeout;
        self
    }

    /// One task per pattern; wide patterns over more than one hour are split in two.
    pub fn plan_tasks(
        &self,
        interval: &FetchInterval,
        patterns: &[String],
        points: &Arc<Vec<GridPoint>>,
        fxx: &[u32],
    ) -> Vec<FetchTask> {
        let dates = interval.hours();
        let mut tasks = Vec::new();

        for pattern in patterns {
            let chunks: Vec<Vec<_>> = if pattern.len() > self.wide_pattern_len && dates.len() > 1 {
                let (first, second) = dates.split_at(dates.len() / 2);
                vec![first.to_vec(), second.to_vec()]
            } else {
                vec![dates.clone()]
            };

            for chunk in chunks {
                tasks.push(FetchTask {
                    id: tasks.len(),
                    interval: *interval,
                    dates: chunk,
                    pattern: pattern.clone(),
                    points: Arc::clone(points),
                    fxx: fxx.to_vec(),
                });
            }
        }

        tasks
    }

    /// Fetch every pattern for `interval`. Either all tasks report before the
    /// collect deadline and succeed, or the interval fails as a whole.
    pub async fn run(
        &self,
        interval: &FetchInterval,
        patterns: &[String],
        points: &Arc<Vec<GridPoint>>,
        fxx: &[u32],
    ) -> Result<Vec<ResultTable>> {
        let tasks = self.plan_tasks(interval, patterns, points, fxx);
        let expected = tasks.len();
        if expected == 0 {
            return Ok(Vec::new());
        }

        debug!(%interval, tasks = expected, source = self.source.name(), "Launching fetch tasks");

        let deadline = Instant::now() + self.collect_timeout;
        let (tx, mut rx) = mpsc::unbounded_channel::<TaskReport>();
        let handles: Vec<JoinHandle<()>> = tasks
            .into_iter()
            .map(|task| spawn_worker(Arc::clone(&self.source), task, tx.clone()))
            .collect();
        drop(tx);

        let collected = self.collect(&mut rx, expected, deadline, interval).await;
        drop(rx);

        self.reclaim(handles).await;

        let (tables, failures) = collected?;
        if let Some(failure) = failures.into_iter().next() {
            return Err(failure);
        }
        Ok(tables)
    }

    async fn collect(
        &self,
        rx: &mut mpsc::UnboundedReceiver<TaskReport>,
        expected: usize,
        deadline: Instant,
        interval: &FetchInterval,
    ) -> Result<(Vec<ResultTable>, Vec<FetchError>)> {
        let mut tables = Vec::with_capacity(expected);
        let mut failures = Vec::new();
        let mut received = 0;

        while received < expected {
            let report = match timeout_at(deadline, rx.recv()).await {
                Ok(Some(report)) => report,
                Ok(None) => {
                    return Err(FetchError::Upstream {
                        pattern: "*".to_string(),
                        message: format!(
                            "{} fetch tasks exited without reporting",
                            expected - received
                        ),
                    })
                }
                Err(_) => {
                    warn!(
                        %interval,
                        received,
                        expected,
                        "Fetch deadline passed, discarding partial results"
                    );
                    return Err(FetchError::FetchTimeout {
                        start: interval.start,
                        end: interval.end,
                        expected,
                        missing: expected - received,
                        deadline: self.collect_timeout,
                    });
                }
            };
            received += 1;

            match report {
                (id, Ok(outcome)) => match outcome.into_table() {
                    Some(mut table) => {
                        let cleared = table.normalize_sentinels(&self.sentinels);
                        debug!(task = id, rows = table.row_count(), cleared, "Task delivered table");
                        tables.push(table);
                    }
                    None => debug!(task = id, "Task found no data"),
                },
                (id, Err(e)) => {
                    warn!(task = id, error = %e, "Fetch task failed");
                    failures.push(e);
                }
            }
        }

        Ok((tables, failures))
    }

    /// Give every worker the join deadline, then detach whatever is still running.
    async fn reclaim(&self, handles: Vec<JoinHandle<()>>) {
        let join_timeout = self.join_timeout;
        let joins = handles
            .into_iter()
            .enumerate()
            .map(|(id, handle)| async move { (id, timeout(join_timeout, handle).await) });

        for (id, joined) in join_all(joins).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = id, error = %e, "Fetch task exited abnormally"),
                Err(_) => warn!(task = id, "Fetch task still running after join deadline, abandoning"),
            }
        }
    }
}

fn spawn_worker(
    source: Arc<dyn ObservationSource>,
    task: FetchTask,
    tx: mpsc::UnboundedSender<TaskReport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = match AssertUnwindSafe(source.fetch(&task)).catch_unwind().await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(FetchError::Upstream { pattern, message })) => {
                Err(FetchError::Upstream { pattern, message })
            }
            Ok(Err(e)) => Err(FetchError::Upstream {
                pattern: task.pattern.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(FetchError::Upstream {
                pattern: task.pattern.clone(),
                message: "fetch task panicked".to_string(),
            }),
        };

        // The controller may have stopped listening after its deadline
        let _ = tx.send((task.id, result));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JoinKey, TableRow};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn interval() -> FetchInterval {
        FetchInterval::half_open(t0(), t0() + chrono::Duration::hours(6))
    }

    fn points() -> Arc<Vec<GridPoint>> {
        Arc::new(vec![GridPoint::new(1, 48.46, -114.21)])
    }

    enum Behaviour {
        Table,
        Empty,
        Hang,
        Panic,
        Fail,
    }

    struct ScriptedSource {
        behaviour: fn(&str) -> Behaviour,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(behaviour: fn(&str) -> Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ObservationSource for ScriptedSource {
        async fn fetch(&self, task: &FetchTask) -> Result<FetchOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match (self.behaviour)(&task.pattern) {
                Behaviour::Table => {
                    let mut table = ResultTable::new(task.pattern.clone(), vec!["t2m".into()]);
                    for date in &task.dates {
                        let key = JoinKey {
                            valid_time: *date,
                            time: *date,
                            step_hours: 0,
                            point_id: 1,
                        };
                        table.push(TableRow::new(key).with_value("t2m", Some(-9999.0)));
                    }
                    Ok(FetchOutcome::Table(table))
                }
                Behaviour::Empty => Ok(FetchOutcome::Empty {
                    pattern: task.pattern.clone(),
                }),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Behaviour::Panic => panic!("source blew up"),
                Behaviour::Fail => Err(FetchError::InvalidFormat("bad payload".into())),
            }
        }
    }

    fn executor(source: Arc<dyn ObservationSource>) -> FetchExecutor {
        FetchExecutor::new(source, &EngineConfig::default())
            .with_timeouts(Duration::from_secs(75), Duration::from_secs(30))
    }

    #[test]
    fn test_wide_patterns_are_split() {
        let exec = executor(ScriptedSource::new(|_| Behaviour::Table));
        let patterns = vec![
            ":TMP:2 m".to_string(),
            ":(?:TMP|SNOD|PRATE|APCP):surface".to_string(),
        ];
        let tasks = exec.plan_tasks(&interval(), &patterns, &points(), &[1]);

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].dates.len(), 6);
        assert_eq!(tasks[1].dates.len(), 3);
        assert_eq!(tasks[2].dates[0], t0() + chrono::Duration::hours(3));
        assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![0, 1, 2]);

        let single = FetchInterval::inclusive(t0(), t0());
        assert_eq!(exec.plan_tasks(&single, &patterns, &points(), &[1]).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_tables_and_normalizes_sentinels() {
        let exec = executor(ScriptedSource::new(|p| {
            if p == "empty" {
                Behaviour::Empty
            } else {
                Behaviour::Table
            }
        }));
        let patterns = vec!["a".to_string(), "empty".to_string()];

        let tables = exec.run(&interval(), &patterns, &points(), &[1]).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].row_count(), 6);
        assert!(tables[0].rows.iter().all(|r| r.values["t2m"].is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_task_times_out_the_interval() {
        let exec = executor(ScriptedSource::new(|p| {
            if p == "slow" {
                Behaviour::Hang
            } else {
                Behaviour::Table
            }
        }));
        let patterns = vec!["fast".to_string(), "slow".to_string()];

        let started = Instant::now();
        let error = exec
            .run(&interval(), &patterns, &points(), &[1])
            .await
            .unwrap_err();

        match error {
            FetchError::FetchTimeout {
                expected, missing, ..
            } => {
                assert_eq!(expected, 2);
                assert_eq!(missing, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Collect deadline plus the join deadline for the abandoned worker
        assert!(started.elapsed() >= Duration::from_secs(105));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_is_isolated() {
        let source = ScriptedSource::new(|p| {
            if p == "bad" {
                Behaviour::Panic
            } else {
                Behaviour::Table
            }
        });
        let exec = executor(source.clone());
        let patterns = vec!["good".to_string(), "bad".to_string()];

        let error = exec
            .run(&interval(), &patterns, &points(), &[1])
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::Upstream { ref pattern, .. } if pattern == "bad"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_error_becomes_upstream() {
        let exec = executor(ScriptedSource::new(|_| Behaviour::Fail));
        let error = exec
            .run(&interval(), &["x".to_string()], &points(), &[1])
            .await
            .unwrap_err();
        assert!(error.to_string().contains("bad payload"));
    }
}
