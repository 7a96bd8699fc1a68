use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use opstat::duration::format_duration;
use opstat::{feed, FileSource, ObservationSource, Settings, StreamSource};

#[derive(Parser, Debug)]
#[command(name = "opstat")]
#[command(about = "Aggregate operation observations into periodic statistics reports")]
struct Args {
    /// Path to a TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read observation records from a JSONL file
    #[arg(short, long, conflicts_with = "connect")]
    input: Option<PathBuf>,

    /// Read observation records from a TCP endpoint (host:port)
    #[arg(long, conflicts_with = "input")]
    connect: Option<String>,

    /// Report interval (e.g., "60s", "5m"), overrides the settings file
    #[arg(long)]
    interval: Option<String>,

    /// Log level (debug, info, notice, warn, error, critical, alert, emergency)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(interval) = args.interval {
        settings.interval = interval;
    }
    if let Some(level) = args.log_level {
        settings.log.level = level;
    }
    settings.validate()?;

    tracing_subscriber::fmt()
        .with_max_level(settings.log_level()?.as_tracing())
        .with_writer(std::io::stderr)
        .init();

    let mut source: Box<dyn ObservationSource> = if let Some(ref path) = args.input {
        Box::new(FileSource::new(path))
    } else if let Some(ref addr) = args.connect {
        Box::new(StreamSource::connect(addr).await?)
    } else {
        Box::new(StreamSource::stdin())
    };

    let handle = settings.build_aggregator()?.start();
    let submitter = handle.submitter();
    tracing::info!(
        source = source.description(),
        interval = %format_duration(settings.interval()?),
        "aggregating observations"
    );

    tokio::select! {
        summary = feed(source.as_mut(), &submitter) => {
            let summary = summary?;
            tracing::info!(
                submitted = summary.submitted,
                skipped = summary.skipped,
                "end of input"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    if settings.flush_on_exit {
        handle.flush_now().await.context("Final flush failed")?;
    }
    handle.stop().await.context("Aggregator did not stop cleanly")?;
    Ok(())
}
