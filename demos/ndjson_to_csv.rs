//! Converts a handful of in-memory NDJSON records to CSV on stdout,
//! validating them against a schema and stopping at the first mismatch.
//!
//! Run with: cargo run --example ndjson_to_csv

use rowpipe::app::{build_pipeline, SettingsBuilder};
use rowpipe::pipeline::{ReaderSource, WriterSink};
use rowpipe::schema::Schema;
use std::error::Error;
use std::io::Cursor;
use tokio_util::sync::CancellationToken;

const INPUT: &str = r#"{"id": 1, "name": "ada", "langs": ["en", "fr"]}
{"id": 2, "name": "grace", "langs": []}
{"id": "three", "name": "linus"}
{"id": 4, "name": "barbara"}
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let schema = Schema::compile(r#"{"id": "int", "name": "string", "langs?": "array"}"#)?;
    let settings = SettingsBuilder::default().stop_on_error(true).build()?;
    let pipeline = build_pipeline(&settings, Some(schema))?;

    let source = ReaderSource::new(Cursor::new(INPUT.as_bytes().to_vec()));
    let mut sink = WriterSink::new(tokio::io::stdout());
    let report = pipeline
        .run(source, &mut sink, &CancellationToken::new())
        .await?;

    eprintln!("rows written: {}", report.messages_written);
    for error in &report.errors {
        eprintln!("  {error}");
    }
    Ok(())
}
