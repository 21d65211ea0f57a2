mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rowpipe::app::{self, Settings, SettingsBuilder};
use rowpipe::pipeline::{Pipeline, ReaderSource, RunReport, Source, WriterSink};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "rowpipe",
    version,
    about = "Convert newline-delimited JSON to CSV, optionally validating records"
)]
struct Cli {
    /// Path to a schema file; records are validated against it
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Stop the pipeline on the first schema mismatch
    #[arg(long)]
    stop: bool,

    /// Keep records that fail the schema instead of dropping them
    #[arg(long)]
    forward_mismatched: bool,

    /// Do not write a CSV header row
    #[arg(long)]
    no_header: bool,

    /// Capacity of each queue between stages
    #[arg(long, default_value_t = rowpipe::pipeline::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Read input from a file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut builder = SettingsBuilder::default();
        builder
            .stop_on_error(self.stop)
            .forward_mismatched(self.forward_mismatched)
            .show_header(!self.no_header)
            .queue_capacity(self.queue_capacity);
        if let Some(path) = &self.schema {
            builder.schema_path(path.clone());
        }
        builder.build().context("invalid settings")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let settings = cli.settings()?;
    let pipeline = app::prepare(&settings).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling pipeline");
            ctrl_c.cancel();
        }
    });

    let report = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open input '{}'", path.display()))?;
            run(pipeline, ReaderSource::new(BufReader::new(file)), &cancel).await?
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            run(pipeline, ReaderSource::new(stdin), &cancel).await?
        }
    };

    for error in &report.errors {
        tracing::error!("{error}");
    }
    if report.has_errors() {
        eprintln!(
            "{} error(s) during conversion, {} row(s) written",
            report.errors.len(),
            report.messages_written
        );
    }
    Ok(())
}

async fn run<S>(pipeline: Pipeline, source: S, cancel: &CancellationToken) -> anyhow::Result<RunReport>
where
    S: Source + 'static,
{
    let mut sink = WriterSink::new(tokio::io::stdout());
    let report = pipeline.run(source, &mut sink, cancel).await?;
    Ok(report)
}
