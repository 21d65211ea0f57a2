pub mod config;
pub mod io;
pub mod pipeline;
pub mod stage;
pub mod types;

pub use config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_QUEUE_CAPACITY};
pub use io::{IterSource, ReaderSource, Sink, Source, WriterSink};
pub use pipeline::Pipeline;
pub use stage::{ErrorSink, Stage, StageContext};
pub use types::{ErrorReport, PipelineError, RunReport, StageError};
