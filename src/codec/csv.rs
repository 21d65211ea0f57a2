use async_trait::async_trait;
use serde_json::Value;

use crate::message::{Message, Record, SharedHeader};
use crate::pipeline::{Stage, StageContext, StageError};

/// Serializes records into CSV rows, one [`Message::Bytes`] per row.
///
/// The header row is written before the first data row, using the shared
/// header. If nothing fixed the header yet, the first record with fields
/// fixes it; records without fields that arrive earlier are held back and
/// written once the columns are known.
/// Each record yields one column per header field: strings raw, numbers and
/// booleans as JSON text, null or missing fields empty, nested values as
/// compact JSON. Fields not in the header are ignored.
#[derive(Debug, Clone)]
pub struct CsvEncoder {
    header: SharedHeader,
    show_header: bool,
}

impl CsvEncoder {
    pub fn new(header: SharedHeader) -> Self {
        CsvEncoder {
            header,
            show_header: true,
        }
    }

    pub fn show_header(mut self, show: bool) -> Self {
        self.show_header = show;
        self
    }
}

/// Builds one CSV row at a time; each call yields exactly the bytes of one row.
struct RowWriter {
    builder: csv::WriterBuilder,
}

impl RowWriter {
    fn new() -> Self {
        let mut builder = csv::WriterBuilder::new();
        builder.terminator(csv::Terminator::Any(b'\n')).flexible(true);
        RowWriter { builder }
    }

    fn row<I, T>(&self, fields: I) -> Result<Vec<u8>, StageError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut writer = self.builder.from_writer(Vec::new());
        writer.write_record(fields)?;
        writer
            .into_inner()
            .map_err(|e| StageError::Encode(e.to_string()))
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn cells(header: &[String], record: &Record) -> Vec<String> {
    header.iter().map(|name| cell(record.get(name))).collect()
}

/// Encodes one row and forwards it. Returns `false` once downstream is gone.
async fn emit<I, T>(ctx: &StageContext, rows: &RowWriter, fields: I) -> bool
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    match rows.row(fields) {
        Ok(row) => ctx.forward(Message::Bytes(row)).await,
        Err(e) => {
            ctx.report(e);
            true
        }
    }
}

#[async_trait]
impl Stage for CsvEncoder {
    fn name(&self) -> &str {
        "csv-encoder"
    }

    async fn run(&self, mut ctx: StageContext) {
        let rows = RowWriter::new();
        let mut header_written = false;
        // Records seen before any record with fields fixed the header.
        let mut pending: Vec<Record> = Vec::new();

        while let Some(message) = ctx.input.recv().await {
            let record = match message {
                Message::Record(record) => record,
                other => {
                    ctx.report(StageError::UnexpectedMessage {
                        expected: "record",
                        found: other.kind(),
                    });
                    continue;
                }
            };

            self.header.set_from_record(&record);
            let Some(header) = self.header.get() else {
                pending.push(record);
                continue;
            };

            if !header_written {
                header_written = true;
                if self.show_header && !emit(&ctx, &rows, header).await {
                    return;
                }
                for earlier in pending.drain(..) {
                    if !emit(&ctx, &rows, cells(header, &earlier)).await {
                        return;
                    }
                }
            }

            if !emit(&ctx, &rows, cells(header, &record)).await {
                return;
            }
        }

        for _ in pending {
            ctx.report(StageError::Encode(
                "record has no fields and no columns were discovered".to_string(),
            ));
        }
    }
}
