use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::message::Message;
use crate::pipeline::{ErrorSink, Stage, StageContext};

/// Builds the inner stage of a [`LazyStage`].
pub trait StageFactory: Send + Sync {
    fn build(&self) -> Box<dyn Stage>;
}

impl<F> StageFactory for F
where
    F: Fn() -> Box<dyn Stage> + Send + Sync,
{
    fn build(&self) -> Box<dyn Stage> {
        self()
    }
}

/// Hosts a stateful inner stage that is only created once the first message
/// arrives.
///
/// On first message the stage spawns two workers: the inner stage, fed
/// through a private queue, and a drain worker that forwards everything the
/// inner stage produces to this stage's output. When the outer input closes,
/// the inner input is closed and this stage waits for both workers before
/// returning, so rows the inner stage emits at end of input are never lost
/// and the outer output closes only after the last of them.
///
/// An input that closes without a single message never creates the inner
/// stage and produces no output at all.
pub struct LazyStage<F> {
    name: String,
    factory: F,
}

struct InnerWorkers {
    input: mpsc::Sender<Message>,
    inner: JoinHandle<()>,
    drain: JoinHandle<()>,
}

impl<F> LazyStage<F>
where
    F: StageFactory,
{
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        LazyStage {
            name: name.into(),
            factory,
        }
    }

    fn spin_up(
        &self,
        output: mpsc::Sender<Message>,
        errors: &ErrorSink,
        cancel: &CancellationToken,
    ) -> InnerWorkers {
        let capacity = output.max_capacity();
        let (inner_tx, inner_rx) = mpsc::channel(capacity);
        let (inner_out_tx, mut inner_out_rx) = mpsc::channel::<Message>(capacity);

        let stage = self.factory.build();
        let inner_name = format!("{}/{}", self.name, stage.name());
        tracing::debug!(stage = %inner_name, "starting inner stage on first message");

        let ctx = StageContext {
            input: inner_rx,
            output: inner_out_tx,
            errors: errors.scoped(&inner_name),
            cancel: cancel.clone(),
        };
        let inner = tokio::spawn(async move { stage.run(ctx).await });

        let drain = tokio::spawn(async move {
            while let Some(message) = inner_out_rx.recv().await {
                if output.send(message).await.is_err() {
                    break;
                }
            }
        });

        InnerWorkers {
            input: inner_tx,
            inner,
            drain,
        }
    }
}

#[async_trait]
impl<F> Stage for LazyStage<F>
where
    F: StageFactory,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: StageContext) {
        let StageContext {
            mut input,
            output,
            errors,
            cancel,
        } = ctx;
        let mut output = Some(output);
        let mut workers: Option<InnerWorkers> = None;

        while let Some(message) = input.recv().await {
            if workers.is_none() {
                if let Some(output) = output.take() {
                    workers = Some(self.spin_up(output, &errors, &cancel));
                }
            }
            let Some(active) = &workers else {
                break;
            };
            if active.input.send(message).await.is_err() {
                tracing::debug!(stage = %self.name, "inner stage stopped consuming");
                break;
            }
        }
        drop(input);

        let Some(InnerWorkers {
            input: inner_input,
            inner,
            drain,
        }) = workers
        else {
            tracing::debug!(stage = %self.name, "input closed before first message");
            return;
        };

        drop(inner_input);
        for handle in [inner, drain] {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }
    }
}
