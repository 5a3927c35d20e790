//! Record sinks and output file naming

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

pub mod json;
pub mod path;

pub use json::JsonArraySink;
pub use path::OutputPathBuilder;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),

    /// Write or finalize after the sink was finalized
    #[error("output sink is already finalized")]
    Closed,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// What a finalized sink left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSummary {
    pub path: PathBuf,
    pub records_written: u64,
    /// True iff at least one record was written and the file closed cleanly
    pub saved: bool,
}

/// Destination for fetched records, shared by concurrently running pages
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append one record
    async fn write(&self, record: &Value) -> OutputResult<()>;

    /// Append records in order, uninterrupted by other writers
    async fn write_batch(&self, records: &[Value]) -> OutputResult<()> {
        for record in records {
            self.write(record).await?;
        }
        Ok(())
    }

    /// Close the output. Only the first call succeeds.
    async fn finalize(&self) -> OutputResult<SinkSummary>;

    /// Abandon the output, removing anything already written.
    async fn discard(&self) -> OutputResult<()> {
        Ok(())
    }
}
