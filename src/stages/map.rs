use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::message::Message;
use crate::pipeline::{ErrorSink, Stage, StageContext, StageError};

/// Shared handles a [`Mapper`] may use while mapping a message.
#[derive(Debug, Clone)]
pub struct MapContext {
    pub cancel: CancellationToken,
    pub errors: ErrorSink,
}

/// One message in, one message out, or a failure.
#[async_trait]
pub trait Mapper: Send + Sync {
    async fn map(&self, ctx: &MapContext, message: Message) -> Result<Message, StageError>;
}

#[async_trait]
impl<F, Fut> Mapper for F
where
    F: Fn(&MapContext, Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Message, StageError>> + Send,
{
    async fn map(&self, ctx: &MapContext, message: Message) -> Result<Message, StageError> {
        self(ctx, message).await
    }
}

/// Adapts a [`Mapper`] into a queue-connected [`Stage`].
///
/// A failed mapping is reported on the error channel and nothing is
/// forwarded for that input.
pub struct MapStage<M> {
    name: String,
    mapper: M,
}

impl<M> MapStage<M>
where
    M: Mapper,
{
    pub fn new(name: impl Into<String>, mapper: M) -> Self {
        MapStage {
            name: name.into(),
            mapper,
        }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }
}

impl<F, Fut> MapStage<F>
where
    F: Fn(&MapContext, Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Message, StageError>> + Send,
{
    /// Builds a stage from an async closure.
    pub fn from_fn(name: impl Into<String>, f: F) -> Self {
        MapStage::new(name, f)
    }
}

#[async_trait]
impl<M> Stage for MapStage<M>
where
    M: Mapper,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut ctx: StageContext) {
        let map_ctx = MapContext {
            cancel: ctx.cancel.clone(),
            errors: ctx.errors.clone(),
        };

        while let Some(message) = ctx.input.recv().await {
            match self.mapper.map(&map_ctx, message).await {
                Ok(mapped) => {
                    if !ctx.forward(mapped).await {
                        tracing::debug!(stage = %self.name, "downstream closed, stopping");
                        break;
                    }
                }
                Err(e) => ctx.report(e),
            }
        }
    }
}
