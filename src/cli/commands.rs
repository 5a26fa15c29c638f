use crate::analyzers::StoreAnalyzer;
use crate::cli::args::{Cli, Commands, ExportFormat, GridColumn, SourceArgs, StoreArgs};
use crate::config::EngineConfig;
use crate::error::{FetchError, Result};
use crate::fetchers::HttpSource;
use crate::models::FetchInterval;
use crate::processors::{
    FetchPipeline, GapCoalescer, GapDetector, OutlierFilter, PlanRequest, TimeColumn,
};
use crate::readers::PointReader;
use crate::utils::progress::ProgressReporter;
use crate::utils::timestamps::{midnight, parse_timestamp};
use crate::writers::{normalize_records, ErrorLog, ObservationStore, ResumeMarker, SliceFormat, SliceWriter};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use validator::Validate;

pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.verbose, cli.log_file.as_deref())?;

    let config = EngineConfig::load(cli.config.as_deref())?;
    debug!(?config, "Configuration loaded");
    let quiet = cli.quiet;

    match cli.command {
        Commands::Fetch {
            start,
            days,
            intervals,
            resume,
            source,
            store,
        } => {
            let config = apply_overrides(config, &store, Some(&source))?;

            let mut start = start.as_deref().map(parse_timestamp).transpose()?;
            if resume {
                match ResumeMarker::new(&config.store.resume_marker).read()? {
                    Some(marker) => {
                        info!(%marker, "Resuming from marker");
                        start = Some(midnight(marker.date()));
                    }
                    None => warn!("No resume marker found, using --start"),
                }
            }

            let request = PlanRequest {
                start,
                days,
                intervals: intervals
                    .iter()
                    .map(|raw| parse_interval(raw))
                    .collect::<Result<Vec<_>>>()?,
            };

            let pipeline = build_pipeline(config, &source, quiet)?;
            let summary = pipeline.fetch_data(&request, now_local()).await?;
            if !quiet {
                println!("\n{}", summary);
            }
        }

        Commands::Refetch { source, store } => {
            let config = apply_overrides(config, &store, Some(&source))?;
            let pipeline = build_pipeline(config, &source, quiet)?;

            let report = pipeline.refetch_data().await?;
            if !quiet {
                println!("\n{}", report.summary());
            }
        }

        Commands::RecoverSeason {
            season,
            day,
            source,
            store,
        } => {
            let config = apply_overrides(config, &store, Some(&source))?;
            let day = parse_day(&day)?;
            let pipeline = build_pipeline(config, &source, quiet)?;

            let fetched = pipeline.recover_season(season, day).await?;
            report_recovery(fetched, quiet);
        }

        Commands::RecoverForecast {
            season,
            day,
            source,
            store,
        } => {
            let config = apply_overrides(config, &store, Some(&source))?;
            let day = parse_day(&day)?;
            let pipeline = build_pipeline(config, &source, quiet)?;

            let fetched = pipeline.recover_forecast(season, day).await?;
            report_recovery(fetched, quiet);
        }

        Commands::Gaps {
            column,
            start,
            end,
            limit,
            store,
        } => {
            let config = apply_overrides(config, &store, None)?;
            let records = normalize_records(ObservationStore::new(config.store_path()).load()?);
            let column = match column {
                GridColumn::Time => TimeColumn::Time,
                GridColumn::ValidTime => TimeColumn::ValidTime,
            };

            let first = records.iter().map(|r| column.of(r)).min();
            let last = records.iter().map(|r| column.of(r)).max();
            let start = start.as_deref().map(parse_timestamp).transpose()?.or(first);
            let end = end.as_deref().map(parse_timestamp).transpose()?.or(last);

            let (Some(start), Some(end)) = (start, end) else {
                println!("Store is empty: {}", config.store_path().display());
                return Ok(());
            };

            let detector = GapDetector::new(config.gaps.excluded_months.clone());
            let report = detector.scan(&records, start, end, column);
            let missing = report.missing();
            let ranges = GapCoalescer::new(config.max_range()).coalesce_intervals(&missing);

            println!("{}", report.summary());
            for hour in missing.iter().take(limit) {
                println!("  {}", hour);
            }
            if missing.len() > limit {
                println!("  ... and {} more", missing.len() - limit);
            }
            println!("\nRanges to refetch: {}", ranges.len());
            for range in ranges.iter().take(limit) {
                println!("  {}", range);
            }
        }

        Commands::Export {
            destination,
            format,
            split_seasons,
            compression,
            no_repair,
            store,
        } => {
            let config = apply_overrides(config, &store, None)?;
            let progress = ProgressReporter::new_spinner("Loading store...", quiet);
            let mut records = normalize_records(ObservationStore::new(config.store_path()).load()?);

            if !no_repair {
                progress.set_message("Repairing out-of-range values...");
                let filter =
                    OutlierFilter::new(config.ingest.plausible_min, config.ingest.plausible_max);
                let repair = filter.repair(&mut records);
                if !repair.unrepaired.is_empty() {
                    warn!(cells = repair.unrepaired.len(), "Out-of-range values left unrepaired");
                }
            }

            progress.set_message(&format!("Writing slices to {}...", destination.display()));
            let format = match format {
                ExportFormat::Csv => SliceFormat::Csv,
                ExportFormat::Parquet => SliceFormat::Parquet,
            };
            let paths = SliceWriter::new(&destination)
                .with_format(format)
                .with_season_split(split_seasons)
                .with_compression(compression)
                .write(&records)?;

            progress.finish_with_message(&format!(
                "Exported {} records to {} files",
                records.len(),
                paths.len()
            ));
        }

        Commands::Info { store } => {
            let config = apply_overrides(config, &store, None)?;
            let store = ObservationStore::new(config.store_path());
            println!("Analyzing store: {}", store.path().display());

            let records = store.load()?;
            let stats = StoreAnalyzer::new().analyze(&records);
            println!("\n{}", stats.detailed_summary());

            let pending = ErrorLog::new(&config.store.error_log).read_entries()?;
            println!("\nLogged failures: {}", pending.len());
            match ResumeMarker::new(&config.store.resume_marker).read()? {
                Some(marker) => println!("Last completed interval end: {}", marker),
                None => println!("No resume marker"),
            }
        }
    }

    Ok(())
}

/// Install the stderr subscriber and, when asked, a plain-text file mirror.
fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hrrr_fetcher={}", log_level)));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| FetchError::Configuration(format!("Failed to initialise logging: {}", e)))?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

fn apply_overrides(
    mut config: EngineConfig,
    store: &StoreArgs,
    source: Option<&SourceArgs>,
) -> Result<EngineConfig> {
    if let Some(dir) = &store.output_dir {
        config.store.output_dir = dir.clone();
    }
    if let Some(file) = &store.output_file {
        config.store.output_file = file.clone();
    }
    if let Some(path) = &store.error_log {
        config.store.error_log = path.clone();
    }
    if let Some(path) = &store.date_log {
        config.store.resume_marker = path.clone();
    }

    if let Some(source) = source {
        if let Some(fxx) = &source.fxx {
            config.fetch.fxx = fxx.clone();
        }
        if let Some(endpoint) = &source.endpoint {
            config.fetch.endpoint = Some(endpoint.clone());
        }
    }

    config.validate()?;
    Ok(config)
}

fn build_pipeline(config: EngineConfig, source: &SourceArgs, quiet: bool) -> Result<FetchPipeline> {
    let points = PointReader::new().read_points(&source.points)?;
    info!(points = points.len(), "Loaded forecast points");

    let endpoint = config.fetch.endpoint.clone().ok_or_else(|| {
        FetchError::Configuration(
            "No upstream endpoint configured; pass --endpoint or set fetch.endpoint".to_string(),
        )
    })?;
    let source = Arc::new(HttpSource::new(endpoint)?);

    Ok(FetchPipeline::new(config, source, points).with_quiet(quiet))
}

/// `START,END` as an inclusive interval.
fn parse_interval(raw: &str) -> Result<FetchInterval> {
    let (start, end) = raw.split_once(',').ok_or_else(|| {
        FetchError::Configuration(format!("Interval must be 'START,END', got '{}'", raw))
    })?;
    Ok(FetchInterval::inclusive(
        parse_timestamp(start)?,
        parse_timestamp(end)?,
    ))
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    Ok(parse_timestamp(raw)?.date())
}

fn report_recovery(fetched: bool, quiet: bool) {
    if quiet {
        return;
    }
    if fetched {
        println!("Fetched missing hours");
    } else {
        println!("No missing hours found");
    }
}

fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
