use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::config::PipelineConfig;
use super::io::{Sink, Source};
use super::stage::{ErrorSink, Stage, StageContext};
use super::types::{PipelineError, RunReport};
use crate::message::Message;

/// An ordered chain of stages connected by bounded queues.
///
/// Every stage runs as its own tokio task. A run owns a child of the
/// caller's cancellation token: cancelling the caller's token stops the run,
/// while a stage cancelling the run does not leak into sibling runs.
pub struct Pipeline {
    config: PipelineConfig,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline {
            config,
            stages: Vec::new(),
        }
    }

    /// Appends a stage to the end of the chain.
    pub fn add<S>(&mut self, stage: S) -> &mut Self
    where
        S: Stage + 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn add_boxed(&mut self, stage: Box<dyn Stage>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of the stages, in pipeline order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs the pipeline until the last stage's output is fully written to
    /// `sink`.
    ///
    /// Per-message failures are returned in the [`RunReport`]; only a sink
    /// or source I/O failure or a panicked worker fails the run.
    pub async fn run<Src, Snk>(
        self,
        mut source: Src,
        sink: &mut Snk,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError>
    where
        Src: Source + 'static,
        Snk: Sink + ?Sized,
    {
        if self.stages.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }

        let capacity = self.config.queue_capacity();
        let cancel = cancel.child_token();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();

        let (source_tx, mut upstream) = mpsc::channel::<Message>(capacity);
        let source_cancel = cancel.clone();
        let source_handle =
            tokio::spawn(async move { source.produce(source_tx, &source_cancel).await });

        let mut handles = Vec::with_capacity(self.stages.len());
        for stage in self.stages {
            let (output, next) = mpsc::channel(capacity);
            let name = stage.name().to_string();
            let ctx = StageContext {
                input: upstream,
                output,
                errors: ErrorSink::new(&name, err_tx.clone()),
                cancel: cancel.clone(),
            };

            let handle = tokio::spawn(async move {
                tracing::debug!(stage = stage.name(), "stage started");
                stage.run(ctx).await;
                tracing::debug!(stage = stage.name(), "stage finished");
            });
            handles.push((name, handle));
            upstream = next;
        }
        drop(err_tx);

        let mut messages_written = 0u64;
        let mut sink_result = Ok(());
        while let Some(message) = upstream.recv().await {
            if let Err(e) = sink.write(message).await {
                sink_result = Err(e);
                break;
            }
            messages_written += 1;
        }
        if sink_result.is_ok() {
            sink_result = sink.finish().await;
        }
        // A failed sink stops reading; closing the last queue lets every
        // upstream stage observe a dead consumer and wind down.
        drop(upstream);

        // Every worker is awaited, even after a panic, so no stage outlives
        // the run.
        let source_joined = source_handle.await;
        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let joined = futures::future::join_all(handles).await;

        let source_result = source_joined.map_err(|source| PipelineError::WorkerPanicked {
            stage: "source".to_string(),
            source,
        })?;
        for (stage, result) in names.into_iter().zip(joined) {
            if let Err(source) = result {
                return Err(PipelineError::WorkerPanicked { stage, source });
            }
        }

        sink_result.map_err(PipelineError::Sink)?;
        source_result.map_err(PipelineError::Source)?;

        err_rx.close();
        let mut errors = Vec::new();
        while let Some(report) = err_rx.recv().await {
            errors.push(report);
        }

        let report = RunReport {
            errors,
            messages_written,
            cancelled: cancel.is_cancelled(),
        };
        tracing::info!(
            messages_written = report.messages_written,
            errors = report.errors.len(),
            cancelled = report.cancelled,
            "pipeline finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
