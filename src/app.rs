//! The standard NDJSON → CSV conversion pipeline.
//!
//! ```text
//! source → json-decode → [schema-gate] → [cancel-guard] → header-discovery → csv (lazy) → sink
//! ```
//!
//! The schema gate is present only when a schema is configured; the cancel
//! guard only when the run should also stop on the first mismatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use derive_builder::Builder;
use thiserror::Error;

use crate::codec::{CsvEncoder, JsonDecoder};
use crate::message::SharedHeader;
use crate::pipeline::{Pipeline, PipelineConfigBuilder, Stage, DEFAULT_QUEUE_CAPACITY};
use crate::schema::{Schema, SchemaError};
use crate::stages::{CancelGuard, HeaderDiscovery, LazyStage, SchemaGate};

/// Errors that prevent a run from starting
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read schema file '{}': {source}", path.display())]
    ReadSchema {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot compile schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("invalid pipeline settings: {0}")]
    Pipeline(String),
}

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct Settings {
    /// Path of the schema file; no schema means no validation
    #[builder(setter(into, strip_option), default)]
    pub(crate) schema_path: Option<PathBuf>,

    /// Stop the whole pipeline on the first schema mismatch
    #[builder(default = "false")]
    pub(crate) stop_on_error: bool,

    /// Forward mismatched records downstream instead of dropping them
    #[builder(default = "false")]
    pub(crate) forward_mismatched: bool,

    /// Emit a CSV header row before the first data row
    #[builder(default = "true")]
    pub(crate) show_header: bool,

    /// Capacity of every inter-stage queue
    #[builder(default = "DEFAULT_QUEUE_CAPACITY")]
    pub(crate) queue_capacity: usize,
}

impl Settings {
    #[inline]
    pub fn schema_path(&self) -> Option<&Path> {
        self.schema_path.as_deref()
    }

    #[inline]
    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error
    }

    #[inline]
    pub fn forward_mismatched(&self) -> bool {
        self.forward_mismatched
    }

    #[inline]
    pub fn show_header(&self) -> bool {
        self.show_header
    }

    #[inline]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            schema_path: None,
            stop_on_error: false,
            forward_mismatched: false,
            show_header: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Reads and compiles a schema file.
pub async fn load_schema(path: &Path) -> Result<Schema, ConfigError> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::ReadSchema {
            path: path.to_path_buf(),
            source,
        })?;
    let schema = Schema::compile(&source)?;
    tracing::debug!(path = %path.display(), "schema compiled");
    Ok(schema)
}

/// Loads the configured schema, if any, and builds the pipeline.
pub async fn prepare(settings: &Settings) -> Result<Pipeline, ConfigError> {
    let schema = match settings.schema_path() {
        Some(path) => Some(load_schema(path).await?),
        None => None,
    };
    build_pipeline(settings, schema)
}

/// Composes the conversion pipeline from settings and an optional compiled
/// schema. `settings.schema_path` is ignored here.
pub fn build_pipeline(settings: &Settings, schema: Option<Schema>) -> Result<Pipeline, ConfigError> {
    let config = PipelineConfigBuilder::default()
        .queue_capacity(settings.queue_capacity())
        .build()
        .map_err(|e| ConfigError::Pipeline(e.to_string()))?;

    let mut pipeline = Pipeline::new(config);
    pipeline.add(JsonDecoder.into_stage());

    match schema {
        Some(schema) => {
            let gate = SchemaGate::new(Arc::new(schema))
                .halt_on_mismatch(settings.stop_on_error())
                .forward_mismatched(settings.forward_mismatched());
            pipeline.add(gate.into_stage());
            if settings.stop_on_error() {
                pipeline.add(CancelGuard::new());
            }
        }
        None if settings.stop_on_error() => {
            tracing::warn!("stop on error requested without a schema, ignoring");
        }
        None => {}
    }

    let header = SharedHeader::new();
    pipeline.add(HeaderDiscovery::new(header.clone()).into_stage());

    let show_header = settings.show_header();
    pipeline.add(LazyStage::new("to-csv", move || {
        Box::new(CsvEncoder::new(header.clone()).show_header(show_header)) as Box<dyn Stage>
    }));

    Ok(pipeline)
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
