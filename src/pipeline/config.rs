// src/pipeline/config.rs

use derive_builder::Builder;

/// Default capacity of every queue between two stages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct PipelineConfig {
    /// Maximum number of messages buffered between two adjacent stages
    #[builder(default = "DEFAULT_QUEUE_CAPACITY")]
    pub(crate) queue_capacity: usize,
}

impl PipelineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.queue_capacity {
            Some(0) => Err("queue_capacity must be at least 1".to_string()),
            _ => Ok(()),
        }
    }
}

impl PipelineConfig {
    /// Returns the capacity of each inter-stage queue
    #[inline]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
