//! CLI entry point for the FIRMS fire-detection aggregator.
//!
//! Fetches every configured sensor feed concurrently, keeps detections inside
//! a region of interest and time window, and writes the merged result.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use firms_aggregator::{
    AggregationPipeline, MergedCollection, Region, TimeWindow,
    config::{AggregatorConfig, map_key_from_env},
    fetch::{BasicClient, fetch_text},
    output::{write_csv, write_geojson, write_json},
    pipeline::process_payload,
};
use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "firms_aggregator")]
#[command(about = "Merge fire detections from several FIRMS sensor feeds", long_about = None)]
struct Cli {
    /// JSON config file (sources, window, scope, timeouts)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Geojson,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all configured feeds, filter them and write the merged collection
    Run {
        /// GeoJSON region of interest (defaults to the config value, then the whole globe)
        #[arg(short, long)]
        region: Option<String>,

        /// Time window: 24h, 48h, 72h or all
        #[arg(short, long)]
        window: Option<TimeWindow>,

        /// Output file, "-" for stdout
        #[arg(short, long, default_value = "-")]
        output: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Geojson)]
        format: OutputFormat,
    },
    /// Filter a single feed payload from a file or URL
    Filter {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Sensor label to tag detections with
        #[arg(short, long, default_value = "local")]
        label: String,

        #[arg(short, long)]
        region: Option<String>,

        #[arg(short, long)]
        window: Option<TimeWindow>,

        #[arg(short, long, default_value = "-")]
        output: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Geojson)]
        format: OutputFormat,
    },
    /// List the configured sensor sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/firms_aggregator.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("firms_aggregator.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AggregatorConfig::load(path)
            .with_context(|| format!("Failed to load config '{path}'"))?,
        None => AggregatorConfig::default(),
    };

    match cli.command {
        Commands::Run {
            region,
            window,
            output,
            format,
        } => {
            let region = load_region(region.as_deref(), &config)?;
            let window = window.unwrap_or(config.window);
            let map_key = map_key_from_env()?;

            let client = BasicClient::new(config.timeout())?;
            let pipeline = AggregationPipeline::new(client, config.pipeline_options(map_key));

            info!(
                sources = config.sources.len(),
                window = %window,
                "Fetching sensor feeds"
            );

            let merged = pipeline
                .run_now(&config.sources, Arc::new(region), window)
                .await?;

            for stats in &merged.stats {
                info!(
                    sensor = %stats.sensor,
                    rows = stats.rows,
                    retained = stats.retained,
                    dropped = stats.dropped(),
                    "Sensor summary"
                );
            }
            if merged.is_empty() {
                info!("No detections matched the region and window");
            }

            write_output(&output, format, &merged)?;
        }
        Commands::Filter {
            source,
            label,
            region,
            window,
            output,
            format,
        } => {
            anyhow::ensure!(!label.trim().is_empty(), "--label must not be empty");
            let region = load_region(region.as_deref(), &config)?;
            let window = window.unwrap_or(config.window);

            let raw = fetcher(&source, &label, &config).await?;
            let (observations, stats) = process_payload(&label, &raw, &region, window, Utc::now());

            let merged = MergedCollection {
                observations,
                stats: vec![stats],
            };
            write_output(&output, format, &merged)?;
        }
        Commands::Sources => {
            for source in &config.sources {
                info!(
                    feed_id = %source.feed_id,
                    label = %source.label,
                    endpoint = %source.endpoint,
                    "Source"
                );
            }
            info!(
                total = config.sources.len(),
                window = %config.window,
                scope = ?config.scope,
                "Source list summary"
            );
        }
    }

    Ok(())
}

fn load_region(flag: Option<&str>, config: &AggregatorConfig) -> Result<Region> {
    let path = flag.map(Path::new).or(config.region.as_deref());
    match path {
        Some(path) => {
            let region = Region::load(path)
                .with_context(|| format!("Failed to load region '{}'", path.display()))?;
            info!(
                path = %path.display(),
                polygons = region.polygons().len(),
                "Region loaded"
            );
            Ok(region)
        }
        None => {
            warn!("No region configured, keeping detections worldwide");
            Ok(Region::world())
        }
    }
}

/// Loads feed data from a local file path or fetches it over HTTP.
#[tracing::instrument(skip_all, fields(source = %source, label = %label))]
async fn fetcher(source: &str, label: &str, config: &AggregatorConfig) -> Result<String> {
    let raw = if source.starts_with("http") {
        let client = BasicClient::new(config.timeout())?;
        fetch_text(&client, label, source, config.timeout()).await?
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read '{source}'"))?
    };
    Ok(raw)
}

fn write_output(path: &str, format: OutputFormat, merged: &MergedCollection) -> Result<()> {
    let writer: Box<dyn Write> = if path == "-" {
        Box::new(std::io::stdout().lock())
    } else {
        Box::new(
            std::fs::File::create(path).with_context(|| format!("Failed to create '{path}'"))?,
        )
    };

    match format {
        OutputFormat::Json => write_json(writer, merged)?,
        OutputFormat::Geojson => write_geojson(writer, merged)?,
        OutputFormat::Csv => write_csv(writer, merged)?,
    }

    if path != "-" {
        info!(path, observations = merged.len(), "Output written");
    }
    Ok(())
}
