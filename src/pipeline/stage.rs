// src/pipeline/stage.rs

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::types::{ErrorReport, StageError};
use crate::message::Message;

/// A queue-connected unit of the pipeline.
///
/// `run` consumes `ctx.input` until it is closed and writes to `ctx.output`.
/// The stage owns the only sender of its output queue, so the queue closes
/// exactly once: when `ctx` (or the sender moved out of it) is dropped.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: StageContext);
}

/// Queue bindings handed to a stage when the pipeline starts it.
pub struct StageContext {
    pub input: mpsc::Receiver<Message>,
    pub output: mpsc::Sender<Message>,
    pub errors: ErrorSink,
    pub cancel: CancellationToken,
}

impl StageContext {
    /// Forwards a message downstream.
    ///
    /// Returns `false` when the downstream consumer has gone away; the caller
    /// should stop consuming.
    pub async fn forward(&self, message: Message) -> bool {
        self.output.send(message).await.is_ok()
    }

    pub fn report(&self, error: StageError) {
        self.errors.report(error);
    }
}

/// Non-blocking handle onto the pipeline's shared error channel, tagged with
/// the name of the stage that holds it.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    stage: Arc<str>,
    tx: mpsc::UnboundedSender<ErrorReport>,
}

impl ErrorSink {
    pub fn new(stage: &str, tx: mpsc::UnboundedSender<ErrorReport>) -> Self {
        Self {
            stage: Arc::from(stage),
            tx,
        }
    }

    /// Creates a sink sharing the same channel under another stage name.
    pub fn scoped(&self, stage: &str) -> Self {
        Self::new(stage, self.tx.clone())
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn report(&self, error: StageError) {
        tracing::debug!(stage = %self.stage, error = %error, "stage reported error");
        // The collector outlives every stage; a failed send only happens
        // once the run is being torn down.
        let _ = self.tx.send(ErrorReport::new(self.stage.as_ref(), error));
    }
}
