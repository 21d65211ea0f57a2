use async_trait::async_trait;
use serde_json::Value;

use crate::message::Message;
use crate::pipeline::StageError;
use crate::stages::{MapContext, MapStage, Mapper};

/// Decodes one JSON object per byte message into a record.
///
/// Field order of the resulting record follows the input document.
/// Records pass through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl JsonDecoder {
    pub fn into_stage(self) -> MapStage<JsonDecoder> {
        MapStage::new("json-decode", self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, StageError> {
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(record) => Ok(Message::Record(record)),
            other => Err(StageError::Decode(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }
}

#[async_trait]
impl Mapper for JsonDecoder {
    async fn map(&self, _ctx: &MapContext, message: Message) -> Result<Message, StageError> {
        match message {
            Message::Bytes(bytes) => Self::decode(&bytes),
            record @ Message::Record(_) => Ok(record),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
