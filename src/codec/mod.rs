//! Record formats at the edges of the pipeline: NDJSON in, CSV out.

pub mod csv;
pub mod json;

pub use self::csv::CsvEncoder;
pub use self::json::JsonDecoder;
