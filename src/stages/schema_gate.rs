use std::sync::Arc;

use async_trait::async_trait;

use super::map::{MapContext, MapStage, Mapper};
use crate::message::Message;
use crate::pipeline::StageError;
use crate::schema::Schema;

/// Checks every message against a compiled [`Schema`].
///
/// With `halt_on_mismatch` the first mismatch cancels the whole run before
/// the failure is returned. Mismatched messages are dropped unless
/// `forward_mismatched` is set, in which case they are reported and still
/// passed downstream.
#[derive(Debug, Clone)]
pub struct SchemaGate {
    schema: Arc<Schema>,
    halt_on_mismatch: bool,
    forward_mismatched: bool,
}

impl SchemaGate {
    pub fn new(schema: Arc<Schema>) -> Self {
        SchemaGate {
            schema,
            halt_on_mismatch: false,
            forward_mismatched: false,
        }
    }

    pub fn halt_on_mismatch(mut self, halt: bool) -> Self {
        self.halt_on_mismatch = halt;
        self
    }

    pub fn forward_mismatched(mut self, forward: bool) -> Self {
        self.forward_mismatched = forward;
        self
    }

    /// Wraps the gate into a pipeline stage.
    pub fn into_stage(self) -> MapStage<SchemaGate> {
        MapStage::new("schema-gate", self)
    }
}

#[async_trait]
impl Mapper for SchemaGate {
    async fn map(&self, ctx: &MapContext, message: Message) -> Result<Message, StageError> {
        let mismatch = match self.schema.check_message(&message) {
            Ok(()) => return Ok(message),
            Err(mismatch) => mismatch,
        };

        // Cancelling again is a no-op; the check only keeps the log to one line.
        if self.halt_on_mismatch && !ctx.cancel.is_cancelled() {
            tracing::info!(reason = %mismatch, "schema mismatch, cancelling pipeline");
            ctx.cancel.cancel();
        }

        let error = StageError::SchemaMismatch(mismatch.to_string());
        if self.forward_mismatched {
            ctx.errors.report(error);
            Ok(message)
        } else {
            Err(error)
        }
    }
}
