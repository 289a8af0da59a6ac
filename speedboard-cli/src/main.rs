//! CLI for the speedboard speedtest dashboard.
//!
//! Renders the dashboard views (latest summary, recent measurements,
//! interval aggregates) from a directory of speedtest result files.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use speedboard::dataset::DEFAULT_RUN_SIZE;
use speedboard::{
    AggregatedBucket, Dashboard, DashboardConfig, Dataset, DatasetLoader, Metric, MetricValues,
    aggregate_to_intervals,
};
use tracing_subscriber::EnvFilter;

/// speedboard — Speedtest dashboard CLI.
#[derive(Parser)]
#[command(name = "speedboard", version, about)]
struct Cli {
    #[command(flatten)]
    overrides: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that override the environment configuration.
#[derive(Args)]
struct ConfigArgs {
    /// Directory holding speedtest-*.json files (overrides DATA_DIR).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Refresh interval in seconds (overrides REFRESH_INTERVAL_SECONDS).
    #[arg(long, global = true)]
    refresh_interval: Option<u64>,

    /// Directory for the cache snapshot (overrides SPEEDBOARD_CACHE_DIR).
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Show the averaged latest test run.
    Summary {
        /// Number of rows that make up one test run.
        #[arg(long, default_value_t = DEFAULT_RUN_SIZE)]
        run_size: usize,
    },

    /// Show the most recent measurements.
    Recent {
        /// Number of measurements to show.
        #[arg(long, default_value = "5")]
        count: usize,
    },

    /// Average measurements over fixed intervals.
    Aggregate {
        /// Interval width in minutes.
        #[arg(long, default_value = "10")]
        interval: u32,

        /// Only include data this far back from the newest row (e.g., "6h", "7d").
        #[arg(long)]
        range: Option<String>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Display data directory, cache location, and load statistics.
    Info,

    /// Re-render the summary every refresh interval.
    Watch {
        /// Stop after this many renders.
        #[arg(long)]
        iterations: Option<u64>,
    },
}

/// Output format for aggregate results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of objects.
    Json,
}

/// Metrics shown on the summary cards and in the recent table.
const HEADLINE: [(Metric, &str); 4] = [
    (Metric::Download, "Download"),
    (Metric::Upload, "Upload"),
    (Metric::Latency, "Latency"),
    (Metric::Jitter, "Jitter"),
];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = build_config(&cli.overrides).and_then(|config| match cli.command {
        Commands::Summary { run_size } => cmd_summary(&config, run_size),
        Commands::Recent { count } => cmd_recent(&config, count),
        Commands::Aggregate {
            interval,
            range,
            format,
        } => cmd_aggregate(&config, interval, range.as_deref(), &format),
        Commands::Info => cmd_info(&config),
        Commands::Watch { iterations } => cmd_watch(config, iterations),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Reads the environment, then applies command-line overrides.
fn build_config(args: &ConfigArgs) -> Result<DashboardConfig, Box<dyn std::error::Error>> {
    let mut config = DashboardConfig::from_env()?;
    if let Some(dir) = &args.data_dir {
        config.data_dir.clone_from(dir);
    }
    if let Some(secs) = args.refresh_interval {
        config.refresh_interval = Duration::from_secs(secs);
    }
    if let Some(dir) = &args.cache_dir {
        config.cache_dir.clone_from(dir);
    }
    config.validate()?;
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        cache_dir = %config.cache_dir.display(),
        refresh_secs = config.refresh_interval.as_secs(),
        "configuration resolved"
    );
    Ok(config)
}

/// Implements `speedboard summary`.
fn cmd_summary(config: &DashboardConfig, run_size: usize) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = DatasetLoader::new(config).load();
    print_summary(&dataset, run_size);
    Ok(())
}

/// Implements `speedboard recent`.
fn cmd_recent(config: &DashboardConfig, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = DatasetLoader::new(config).load();
    if dataset.is_empty() {
        println!("No data available yet.");
        return Ok(());
    }

    let rows = dataset.latest(count);
    println!("Last {} Measurements", rows.len());
    println!();
    println!(
        "{:<16}  {:>15}  {:>13}  {:>12}  {:>11}",
        "Time", "Download (Mbps)", "Upload (Mbps)", "Latency (ms)", "Jitter (ms)"
    );
    for row in rows {
        let [download, upload, latency, jitter] =
            HEADLINE.map(|(metric, _)| format_cell(row.metrics.get(metric)));
        println!(
            "{:<16}  {download:>15}  {upload:>13}  {latency:>12}  {jitter:>11}",
            row.timestamp.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// Implements `speedboard aggregate`.
fn cmd_aggregate(
    config: &DashboardConfig,
    interval: u32,
    range: Option<&str>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = DatasetLoader::new(config).load();
    let mut buckets = aggregate_to_intervals(&dataset, interval)?;

    if let Some(range) = range {
        let span = parse_duration(range)?;
        if let Some((_, newest)) = dataset.time_range() {
            retain_within(&mut buckets, newest, span, interval);
        }
    }

    match format {
        OutputFormat::Csv => print_buckets_csv(&buckets, interval),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "interval_minutes": interval,
                "count": buckets.len(),
                "data": buckets,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Implements `speedboard info`.
fn cmd_info(config: &DashboardConfig) -> Result<(), Box<dyn std::error::Error>> {
    let loader = DatasetLoader::new(config);
    let (dataset, report) = loader.load_with_report();

    println!("Data directory: {}", config.data_dir.display());
    println!("Cache file: {}", loader.cache().path().display());
    println!("Refresh interval: {}", format_duration_secs(config.refresh_interval.as_secs()));
    println!();
    println!("Load: {}", report.outcome);
    println!("  Files on disk: {}", report.files_on_disk);
    println!("  Cached rows: {}", report.cached_rows);
    println!("  Files parsed: {}", report.files_parsed);
    println!("  Files rejected: {}", report.rejected());
    println!("  Rows: {}", dataset.len());

    if let Some((first, last)) = dataset.time_range() {
        println!();
        println!("Oldest: {}", first.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("Newest: {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
        let columns: Vec<_> = dataset.metric_columns().into_iter().map(Metric::key).collect();
        println!("Metrics: {}", columns.join(", "));
    }
    Ok(())
}

/// Implements `speedboard watch`.
fn cmd_watch(config: DashboardConfig, iterations: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let pause = config.refresh_interval.max(Duration::from_secs(1));
    let dashboard = Dashboard::new(config);

    let mut rendered = 0u64;
    loop {
        let dataset = dashboard.dataset();
        println!("--- {} ---", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        print_summary(&dataset, DEFAULT_RUN_SIZE);
        println!();

        rendered += 1;
        if iterations.is_some_and(|limit| rendered >= limit) {
            return Ok(());
        }
        std::thread::sleep(pause);
    }
}

/// Prints the four summary cards for the latest run.
fn print_summary(dataset: &Dataset, run_size: usize) {
    let Some(summary) = dataset.latest_summary(run_size) else {
        println!("No data available yet.");
        return;
    };

    println!("Latest Measurement");
    println!(
        "Recorded at: {} (last of the set)",
        summary.recorded_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    for (metric, label) in HEADLINE {
        println!("  {label:<9} {}", format_card(&summary.means, metric));
    }
    println!();
    println!("Averaged over the last {} measurements.", summary.rows);
}

fn print_buckets_csv(buckets: &[AggregatedBucket], interval: u32) {
    println!("# interval={interval}m, buckets={}", buckets.len());
    let header: Vec<&str> = Metric::ALL.into_iter().map(Metric::key).collect();
    println!("timestamp,count,{}", header.join(","));
    for bucket in buckets {
        let values: Vec<String> = Metric::ALL
            .iter()
            .map(|&m| bucket.means.get(m).map(|v| format!("{v}")).unwrap_or_default())
            .collect();
        println!("{},{},{}", format_timestamp(bucket.timestamp), bucket.count, values.join(","));
    }
}

/// Formats a summary card value; a missing mean shows as zero.
fn format_card(means: &MetricValues, metric: Metric) -> String {
    let value = means.get(metric).unwrap_or(0.0);
    format!("{value:.2} {}", metric.spec().unit)
}

/// Formats a table cell to two decimals, `-` when absent.
fn format_cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Keeps buckets that end after `newest - span`.
///
/// A span reaching past the earliest representable instant keeps everything.
fn retain_within(
    buckets: &mut Vec<AggregatedBucket>,
    newest: DateTime<Utc>,
    span: chrono::Duration,
    interval: u32,
) {
    let Some(cutoff) = newest.checked_sub_signed(span) else {
        return;
    };
    let width = chrono::Duration::minutes(i64::from(interval));
    buckets.retain(|b| b.timestamp.checked_add_signed(width).is_none_or(|end| end > cutoff));
}

/// Parses a human-readable duration string (e.g., "1h", "30m", "7d").
fn parse_duration(s: &str) -> Result<chrono::Duration, Box<dyn std::error::Error>> {
    let s = s.trim();
    let Some((split, _)) = s.char_indices().last() else {
        return Err("Empty duration string".into());
    };

    let (num_str, unit) = s.split_at(split);
    let num: i64 = num_str.parse()?;

    let duration = match unit {
        "s" => chrono::Duration::try_seconds(num),
        "m" => chrono::Duration::try_minutes(num),
        "h" => chrono::Duration::try_hours(num),
        "d" => chrono::Duration::try_days(num),
        _ => return Err(format!("Unknown duration unit: '{unit}'. Use s, m, h, or d.").into()),
    };
    duration.ok_or_else(|| format!("Duration out of range: '{s}'").into())
}

/// Formats seconds as a human-readable duration.
fn format_duration_secs(secs: u64) -> String {
    if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
