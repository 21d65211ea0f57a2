//! # rowpipe
//!
//! A concurrent record-stream pipeline built on Tokio: decode NDJSON,
//! optionally gate it through a schema, and re-serialize it as CSV while
//! keeping message order.
//!
//! ## Features
//!
//! - **Composable stages** connected by bounded queues, each on its own task
//! - **Backpressure** from slow consumers through every upstream stage
//! - **Cooperative cancellation** via a shared `CancellationToken`
//! - **Lazy sub-pipelines** that start only when data actually arrives
//! - **Errors as values**, collected on a side channel and reported per run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rowpipe::app::{build_pipeline, Settings};
//! use rowpipe::pipeline::{ReaderSource, WriterSink};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = build_pipeline(&Settings::default(), None)?;
//! let source = ReaderSource::new(tokio::io::BufReader::new(tokio::io::stdin()));
//! let mut sink = WriterSink::new(tokio::io::stdout());
//! let report = pipeline.run(source, &mut sink, &CancellationToken::new()).await?;
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`] - Stage trait, queues, composer, sources and sinks
//! - [`stages`] - Mapping adapter, schema gate, cancel guard, header discovery, lazy stage
//! - [`codec`] - NDJSON decoder and CSV encoder
//! - [`schema`] - Declarative record schemas
//! - [`app`] - The standard conversion pipeline and its settings

pub mod app;
pub mod codec;
pub mod message;
pub mod pipeline;
pub mod schema;
pub mod stages;

pub use message::{Message, Record, SharedHeader};
