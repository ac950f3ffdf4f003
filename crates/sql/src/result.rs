use std::io::Cursor;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::ipc::reader::StreamReader;
use flightline_common::Result;
use flightline_transport::ReassembledStream;

/// Fully decoded result of one do-get stream.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub batches: Vec<RecordBatch>,
    pub total_rows: usize,
    schema: Option<SchemaRef>,
}

impl QueryResult {
    /// Decodes a reassembled IPC stream. An empty stream yields an empty result with no schema.
    pub fn decode(stream: &ReassembledStream) -> Result<Self> {
        if stream.is_empty() {
            return Ok(Self::default());
        }
        let reader = StreamReader::try_new(Cursor::new(stream.as_bytes()), None)?;
        let schema = reader.schema();
        let batches = reader.collect::<std::result::Result<Vec<_>, ArrowError>>()?;
        Ok(Self::from_batches(schema, batches))
    }

    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        let total_rows = batches.iter().map(RecordBatch::num_rows).sum();
        Self {
            batches,
            total_rows,
            schema: Some(schema),
        }
    }

    pub fn schema(&self) -> Option<SchemaRef> {
        self.schema.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }
}
