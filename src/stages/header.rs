use async_trait::async_trait;

use super::map::{MapContext, MapStage, Mapper};
use crate::message::{Message, SharedHeader};
use crate::pipeline::StageError;

/// Fixes the output header from the first record that reaches it.
///
/// Whether the header is populated is decided by the header itself, not by
/// counting messages, so records dropped upstream do not matter. Records
/// without fields pass through and leave the header open.
#[derive(Debug, Clone)]
pub struct HeaderDiscovery {
    header: SharedHeader,
}

impl HeaderDiscovery {
    pub fn new(header: SharedHeader) -> Self {
        HeaderDiscovery { header }
    }

    pub fn header(&self) -> &SharedHeader {
        &self.header
    }

    pub fn into_stage(self) -> MapStage<HeaderDiscovery> {
        MapStage::new("header-discovery", self)
    }
}

#[async_trait]
impl Mapper for HeaderDiscovery {
    async fn map(&self, _ctx: &MapContext, message: Message) -> Result<Message, StageError> {
        let Some(record) = message.as_record() else {
            return Err(StageError::UnexpectedMessage {
                expected: "record",
                found: message.kind(),
            });
        };

        if !self.header.is_set() && self.header.set_from_record(record) {
            tracing::debug!(columns = record.len(), "output header fixed");
        }
        Ok(message)
    }
}
