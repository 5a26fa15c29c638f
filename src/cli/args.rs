use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hrrr-fetcher")]
#[command(about = "Fetch, reconcile and export hourly gridded weather data for fixed forecast points")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Suppress progress bars and summaries")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,
}

/// Store locations; each flag overrides the configured value.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    #[arg(long, help = "Directory holding the observation store")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, help = "Observation store file name")]
    pub output_file: Option<String>,

    #[arg(long, help = "Error log path")]
    pub error_log: Option<PathBuf>,

    #[arg(long, help = "Resume marker path")]
    pub date_log: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(short, long, help = "Points CSV (id,latitude,longitude)")]
    pub points: PathBuf,

    #[arg(long, help = "Extraction service endpoint [default: from config]")]
    pub endpoint: Option<String>,

    #[arg(long, value_delimiter = ',', help = "Forecast leads to fetch [default: from config]")]
    pub fxx: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GridColumn {
    Time,
    ValidTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Parquet,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch 6-hour intervals for a day range or explicit intervals
    Fetch {
        #[arg(short, long, help = "First day to fetch (YYYY-MM-DD)")]
        start: Option<String>,

        #[arg(short = 'n', long, help = "Number of days to fetch")]
        days: Option<u32>,

        #[arg(
            short,
            long = "interval",
            help = "Explicit inclusive interval 'START,END'; repeatable"
        )]
        intervals: Vec<String>,

        #[arg(long, help = "Start from the resume marker when present")]
        resume: bool,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Retry logged failures, then fill remaining gaps by re-fetch and interpolation
    Refetch {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Fill missing hours of a season (Oct 1 of SEASON up to DAY)
    RecoverSeason {
        #[arg(long, help = "Season start year")]
        season: i32,

        #[arg(long, help = "Last day to check (YYYY-MM-DD)")]
        day: String,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Fill missing forecast hours (Dec 1 of SEASON through DAY) from 00:00 runs
    RecoverForecast {
        #[arg(long, help = "Season start year")]
        season: i32,

        #[arg(long, help = "Last day to check (YYYY-MM-DD)")]
        day: String,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Report missing hours and the ranges a refetch would request
    Gaps {
        #[arg(long, value_enum, default_value = "time")]
        column: GridColumn,

        #[arg(long, help = "Grid start [default: first stored hour]")]
        start: Option<String>,

        #[arg(long, help = "Grid end [default: last stored hour]")]
        end: Option<String>,

        #[arg(long, default_value = "20", help = "Maximum hours to list")]
        limit: usize,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Write one file per point and forecast lead
    Export {
        #[arg(short, long, help = "Directory to write slices to")]
        destination: PathBuf,

        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        #[arg(long, help = "Split each slice by season (Oct 1 - Jun 1)")]
        split_seasons: bool,

        #[arg(long, default_value = "snappy")]
        compression: String,

        #[arg(long, help = "Skip out-of-range value repair")]
        no_repair: bool,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Display summary statistics for the observation store
    Info {
        #[command(flatten)]
        store: StoreArgs,
    },
}
