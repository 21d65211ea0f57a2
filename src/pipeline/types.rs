use std::fmt;

use thiserror::Error;

/// Per-message failures. These travel as values on the error channel and
/// never stop the pipeline on their own.
#[derive(Debug, Error)]
pub enum StageError {
    /// Input bytes could not be decoded into a record.
    #[error("decode failed: {0}")]
    Decode(String),

    /// A stage received a message variant it cannot handle.
    #[error("unexpected {found} message, expected {expected}")]
    UnexpectedMessage {
        expected: &'static str,
        found: &'static str,
    },

    /// A record did not satisfy the configured schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The stage observed the cancellation signal and stopped consuming.
    #[error("pipeline cancelled")]
    Cancelled,

    /// A record could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        StageError::Decode(err.to_string())
    }
}

impl From<csv::Error> for StageError {
    fn from(err: csv::Error) -> Self {
        StageError::Encode(err.to_string())
    }
}

/// A stage-local failure, tagged with the stage that produced it.
#[derive(Debug)]
pub struct ErrorReport {
    pub stage: String,
    pub error: StageError,
}

impl ErrorReport {
    pub fn new(stage: impl Into<String>, error: StageError) -> Self {
        Self {
            stage: stage.into(),
            error,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self.error, StageError::Cancelled)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

/// Run-level failures. Unlike [`StageError`], these abort the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline has no stages")]
    EmptyPipeline,

    #[error("invalid pipeline configuration: {0}")]
    Configuration(String),

    #[error("source failed: {0}")]
    Source(#[source] std::io::Error),

    #[error("sink failed: {0}")]
    Sink(#[source] std::io::Error),

    /// A worker task panicked or was aborted.
    #[error("worker '{stage}' failed: {source}")]
    WorkerPanicked {
        stage: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Every error report emitted during the run, in arrival order.
    pub errors: Vec<ErrorReport>,
    /// Number of messages the sink wrote.
    pub messages_written: u64,
    /// Whether the cancellation signal was set when the run finished.
    pub cancelled: bool,
}

impl RunReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn cancellation_reports(&self) -> usize {
        self.errors.iter().filter(|r| r.is_cancellation()).count()
    }
}
