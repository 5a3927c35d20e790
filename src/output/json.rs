//! Streaming JSON array writer
//!
//! Records are appended to a single top-level array as they arrive, so the
//! full result set is never held in memory.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{OutputError, OutputResult, RecordSink, SinkSummary};
use crate::downloader::config::FLUSH_INTERVAL;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024; // 64KB buffer

/// UTF-8 byte order mark, written first when requested
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

struct SinkState {
    writer: Option<BufWriter<File>>,
    records_written: u64,
}

/// Incremental writer of one JSON array file
pub struct JsonArraySink {
    path: PathBuf,
    state: Mutex<SinkState>,
}

impl JsonArraySink {
    /// Create the file (and its parent directory) and open the array.
    ///
    /// # Arguments
    /// * `path` - Output file path; an existing file is truncated
    /// * `include_bom` - Prefix the file with a UTF-8 byte order mark
    pub async fn create(path: impl AsRef<Path>, include_bom: bool) -> OutputResult<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Creating JSON output: path={}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let file = File::create(&path)
            .await
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
        let mut writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);

        if include_bom {
            writer
                .write_all(UTF8_BOM)
                .await
                .map_err(|e| OutputError::IoError(format!("Failed to write BOM: {e}")))?;
        }
        writer
            .write_all(b"[")
            .await
            .map_err(|e| OutputError::IoError(format!("Failed to open array: {e}")))?;

        Ok(Self {
            path,
            state: Mutex::new(SinkState {
                writer: Some(writer),
                records_written: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written so far
    pub async fn records_written(&self) -> u64 {
        self.state.lock().await.records_written
    }

    async fn append(state: &mut SinkState, record: &Value) -> OutputResult<()> {
        let encoded = serde_json::to_vec(record)
            .map_err(|e| OutputError::SerializationError(format!("Failed to encode record: {e}")))?;
        let separator: &[u8] = if state.records_written == 0 { b"\n" } else { b",\n" };

        let writer = state.writer.as_mut().ok_or(OutputError::Closed)?;
        writer
            .write_all(separator)
            .await
            .map_err(|e| OutputError::IoError(format!("Failed to write record: {e}")))?;
        writer
            .write_all(&encoded)
            .await
            .map_err(|e| OutputError::IoError(format!("Failed to write record: {e}")))?;

        state.records_written += 1;

        if state.records_written % FLUSH_INTERVAL == 0 {
            writer
                .flush()
                .await
                .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))?;
            debug!("Progress: {} records written", state.records_written);
        }

        Ok(())
    }
}

#[async_trait]
impl RecordSink for JsonArraySink {
    async fn write(&self, record: &Value) -> OutputResult<()> {
        let mut state = self.state.lock().await;
        Self::append(&mut state, record).await
    }

    async fn write_batch(&self, records: &[Value]) -> OutputResult<()> {
        let mut state = self.state.lock().await;
        for record in records {
            Self::append(&mut state, record).await?;
        }
        Ok(())
    }

    /// Close the array, flush, sync and close the file. With no records the
    /// file is deleted and `saved` is false.
    async fn finalize(&self) -> OutputResult<SinkSummary> {
        let mut state = self.state.lock().await;
        let mut writer = state.writer.take().ok_or(OutputError::Closed)?;
        let records_written = state.records_written;

        debug!("Closing JSON output: {} total records written", records_written);

        let closing: &[u8] = if records_written == 0 { b"]\n" } else { b"\n]\n" };
        writer
            .write_all(closing)
            .await
            .map_err(|e| OutputError::IoError(format!("Failed to close array: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))?;

        let file = writer.into_inner();
        file.sync_all()
            .await
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;
        drop(file);

        if records_written == 0 {
            tokio::fs::remove_file(&self.path)
                .await
                .map_err(|e| OutputError::IoError(format!("Failed to remove empty output: {e}")))?;
            info!("No records written, removed {}", self.path.display());
        } else {
            info!(
                "JSON output closed successfully: {} records written to {}",
                records_written,
                self.path.display()
            );
        }

        Ok(SinkSummary {
            path: self.path.clone(),
            records_written,
            saved: records_written > 0,
        })
    }

    /// Drop the unterminated array so it is never mistaken for a result.
    async fn discard(&self) -> OutputResult<()> {
        let mut state = self.state.lock().await;
        drop(state.writer.take());

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                warn!(
                    "Removed partial output {} ({} records)",
                    self.path.display(),
                    state.records_written
                );
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OutputError::IoError(format!(
                "Failed to remove partial output {}: {e}",
                self.path.display()
            ))),
        }
    }
}
