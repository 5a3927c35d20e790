//! Output and log file naming
//!
//! Every run writes `<dir>/<YYYYMMDD_HHMMSS>_results.json`, stamped with the
//! run's start time so that the output, the log file and the cursor agree.
//!
//! ```rust
//! use catalog_export::output::OutputPathBuilder;
//! use chrono::{TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 31, 9, 5, 7).unwrap();
//! let path = OutputPathBuilder::new("results", start).results_file();
//! assert_eq!(path.to_str().unwrap(), "results/20240131_090507_results.json");
//! ```

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Suffix shared by result and log files
const RESULTS_STEM: &str = "results";

/// Builder for per-run file paths
#[derive(Debug, Clone)]
pub struct OutputPathBuilder {
    dir: PathBuf,
    start: DateTime<Utc>,
    file_name: Option<String>,
}

impl OutputPathBuilder {
    pub fn new(dir: impl Into<PathBuf>, start: DateTime<Utc>) -> Self {
        Self {
            dir: dir.into(),
            start,
            file_name: None,
        }
    }

    /// Use a fixed file name instead of the timestamped default.
    pub fn with_file_name(mut self, file_name: Option<String>) -> Self {
        self.file_name = file_name.filter(|name| !name.trim().is_empty());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `YYYYMMDD_HHMMSS` of the run start
    pub fn timestamp(&self) -> String {
        self.start.format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn results_file(&self) -> PathBuf {
        match &self.file_name {
            Some(name) => self.dir.join(name),
            None => self.dir.join(format!("{}_{RESULTS_STEM}.json", self.timestamp())),
        }
    }

    /// Log file next to the results, sharing their timestamp
    pub fn log_file(&self) -> PathBuf {
        self.dir.join(format!("{}_{RESULTS_STEM}.log", self.timestamp()))
    }
}
