use async_trait::async_trait;

use crate::pipeline::{Stage, StageContext, StageError};

/// Forwards messages until the run is cancelled.
///
/// Unlike other stages this one does not drain its input: once it sees the
/// cancellation signal it reports a single [`StageError::Cancelled`] and
/// stops consuming, abandoning whatever is still queued upstream. Closing
/// its input this way lets upstream stages stop as soon as they next send.
#[derive(Debug, Clone)]
pub struct CancelGuard {
    name: String,
}

impl CancelGuard {
    pub fn new() -> Self {
        CancelGuard {
            name: "cancel-guard".to_string(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        CancelGuard { name: name.into() }
    }
}

impl Default for CancelGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for CancelGuard {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut ctx: StageContext) {
        let mut forwarded = 0u64;
        while let Some(message) = ctx.input.recv().await {
            if ctx.cancel.is_cancelled() {
                tracing::debug!(stage = %self.name, forwarded, "cancelled, abandoning input");
                ctx.report(StageError::Cancelled);
                return;
            }
            if !ctx.forward(message).await {
                return;
            }
            forwarded += 1;
        }

        // Cancellation raised by the very last message upstream arrives
        // together with the end of input.
        if ctx.cancel.is_cancelled() {
            ctx.report(StageError::Cancelled);
        }
    }
}
