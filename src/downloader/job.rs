//! Run outcome and status

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A page that did not make it into the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPage {
    /// Offset the page was requested at
    pub offset: u64,
    /// Requested window end (exclusive)
    pub end: u64,
    /// Why it failed
    pub error: String,
}

/// Final status of a run, mapped to the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportStatus {
    /// Every page succeeded and the output was saved
    Completed,
    /// The API reported nothing to download
    NoRecords,
    /// Some pages failed; the output holds the rest
    Partial,
}

impl ExportStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExportStatus::Completed | ExportStatus::NoRecords => 0,
            ExportStatus::Partial => 2,
        }
    }
}

/// What a run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Record count reported by the probe
    pub records_expected: u64,
    /// Sum of records returned by successful pages
    pub records_downloaded: u64,
    /// Pages dispatched
    pub pages_dispatched: usize,
    /// Pages that failed, by offset
    pub failed_pages: Vec<FailedPage>,
    /// True iff at least one record was written and the output closed cleanly
    pub saved: bool,
    /// Output file, when one was created
    pub output_path: Option<PathBuf>,
}

impl RunOutcome {
    /// Outcome of a run whose probe reported zero records.
    pub fn empty() -> Self {
        Self {
            records_expected: 0,
            records_downloaded: 0,
            pages_dispatched: 0,
            failed_pages: Vec::new(),
            saved: false,
            output_path: None,
        }
    }

    /// No page failed.
    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
    }

    pub fn status(&self) -> ExportStatus {
        if !self.is_complete() {
            ExportStatus::Partial
        } else if self.pages_dispatched == 0 {
            ExportStatus::NoRecords
        } else {
            ExportStatus::Completed
        }
    }

    /// Offsets of failed pages, ascending.
    pub fn failed_offsets(&self) -> Vec<u64> {
        let mut offsets: Vec<u64> = self.failed_pages.iter().map(|p| p.offset).collect();
        offsets.sort_unstable();
        offsets
    }
}
