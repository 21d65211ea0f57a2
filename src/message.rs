//! Messages flowing between stages and the write-once output header.

use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

/// A decoded record. Field order is insertion order of the decoder.
pub type Record = Map<String, Value>;

/// A unit of work travelling through a pipeline queue.
///
/// The engine never looks inside a message; only record-aware stages
/// (header discovery, schema gate, encoders) do.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Raw, undecoded bytes (an input line or a serialized output row).
    Bytes(Vec<u8>),
    /// A structured record with named fields.
    Record(Record),
}

impl Message {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Message::Record(record) => Some(record),
            Message::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Message::Bytes(bytes) => Some(bytes),
            Message::Record(_) => None,
        }
    }

    /// Short name of the variant, used in error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Bytes(_) => "bytes",
            Message::Record(_) => "record",
        }
    }
}

impl From<Record> for Message {
    fn from(record: Record) -> Self {
        Message::Record(record)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Message::Bytes(bytes)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Bytes(text.as_bytes().to_vec())
    }
}

/// Ordered output column names, fixed exactly once and shared between the
/// stage that discovers them and the encoder that uses them.
#[derive(Debug, Clone, Default)]
pub struct SharedHeader {
    fields: Arc<OnceLock<Vec<String>>>,
}

impl SharedHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the header if it has been fixed.
    pub fn get(&self) -> Option<&[String]> {
        self.fields.get().map(Vec::as_slice)
    }

    pub fn is_set(&self) -> bool {
        self.fields.get().is_some()
    }

    /// Fixes the header from the record's field names, in record order.
    ///
    /// Returns `true` if this call fixed the header, `false` if it was
    /// already fixed (in which case the header is left untouched). A record
    /// without fields never fixes the header.
    pub fn set_from_record(&self, record: &Record) -> bool {
        if record.is_empty() {
            return false;
        }
        let mut fixed = false;
        self.fields.get_or_init(|| {
            fixed = true;
            record.keys().cloned().collect()
        });
        fixed
    }
}
