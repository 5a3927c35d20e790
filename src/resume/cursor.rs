//! Last-run cursor persistence
//!
//! After a fully successful run the start time is stored as
//! `{"orgid": "<uuid>", "updatedSince": "<ISO-8601>"}`. The next run for the
//! same organization asks only for records updated since then. A cursor that
//! fails validation or belongs to another organization is deleted and ignored.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::lock::CursorLock;
use crate::identifier::{OrgId, OrgIdError};

/// Cursor files are tiny; anything bigger is not ours
pub const MAX_CURSOR_FILE_SIZE: u64 = 64 * 1024;

/// On-disk cursor record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunCursor {
    pub orgid: String,
    #[serde(rename = "updatedSince")]
    pub updated_since: String,
}

impl RunCursor {
    pub fn new(org_id: &OrgId, updated_since: DateTime<Utc>) -> Self {
        Self {
            orgid: org_id.to_string(),
            updated_since: format_timestamp(updated_since),
        }
    }

    /// Check the record's shape: a UUID org id and an ISO-8601 timestamp.
    pub fn validate(&self) -> Result<(OrgId, DateTime<Utc>), CursorError> {
        let org_id = OrgId::parse(&self.orgid)?;
        let updated_since = parse_iso8601(&self.updated_since)
            .ok_or_else(|| CursorError::InvalidTimestamp(self.updated_since.clone()))?;
        Ok((org_id, updated_since))
    }
}

/// What a cursor file holds relative to the run's organization
#[derive(Debug)]
pub enum CursorStatus {
    /// No cursor file
    Absent,
    /// Valid and for this organization
    Trusted(DateTime<Utc>),
    /// Valid, but written for another organization
    OrgMismatch(OrgId),
    /// Fails validation
    Invalid(CursorError),
    /// Could not be read; left in place
    Unreadable(CursorError),
}

/// Loads and stores the cursor file
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Classify the cursor without changing anything on disk.
    pub fn inspect(&self, expected: &OrgId) -> CursorStatus {
        match self.read() {
            Ok(None) => CursorStatus::Absent,
            Ok(Some(cursor)) => match cursor.validate() {
                Ok((org_id, updated_since)) if org_id == *expected => {
                    CursorStatus::Trusted(updated_since)
                }
                Ok((org_id, _)) => CursorStatus::OrgMismatch(org_id),
                Err(e) => CursorStatus::Invalid(e),
            },
            Err(e @ CursorError::Malformed(_)) | Err(e @ CursorError::TooLarge { .. }) => {
                CursorStatus::Invalid(e)
            }
            Err(e) => CursorStatus::Unreadable(e),
        }
    }

    /// Timestamp to resume from, if the cursor can be trusted.
    ///
    /// Invalid cursors and cursors of another organization are deleted.
    pub fn load(&self, expected: &OrgId) -> Option<DateTime<Utc>> {
        match self.inspect(expected) {
            CursorStatus::Trusted(updated_since) => {
                info!(
                    path = %self.path.display(),
                    updated_since = %format_timestamp(updated_since),
                    "Using last run cursor"
                );
                Some(updated_since)
            }
            CursorStatus::Absent => {
                debug!(path = %self.path.display(), "No last run cursor found");
                None
            }
            CursorStatus::OrgMismatch(found) => {
                warn!(
                    path = %self.path.display(),
                    found = %found,
                    expected = %expected,
                    "Last run cursor belongs to another organization, deleting"
                );
                self.discard();
                None
            }
            CursorStatus::Invalid(e) => {
                warn!(path = %self.path.display(), error = %e, "Invalid last run cursor, deleting");
                self.discard();
                None
            }
            CursorStatus::Unreadable(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read last run cursor, ignoring");
                None
            }
        }
    }

    /// Overwrite the cursor atomically.
    pub fn store(&self, org_id: &OrgId, updated_since: DateTime<Utc>) -> Result<(), CursorError> {
        let cursor = RunCursor::new(org_id, updated_since);
        let json = serde_json::to_string_pretty(&cursor)
            .map_err(|e| CursorError::SerializationError(e.to_string()))?;

        let mut lock = CursorLock::open(&self.path)?;
        lock.exclusive(|| {
            let parent_dir = self
                .path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
                .map_err(|e| CursorError::IoError(format!("Failed to create temp file: {e}")))?;

            temp_file
                .write_all(json.as_bytes())
                .map_err(|e| CursorError::IoError(format!("Failed to write to temp file: {e}")))?;
            temp_file
                .flush()
                .map_err(|e| CursorError::IoError(format!("Failed to flush temp file: {e}")))?;
            temp_file
                .as_file()
                .sync_all()
                .map_err(|e| CursorError::IoError(format!("Failed to sync temp file: {e}")))?;
            temp_file
                .persist(&self.path)
                .map_err(|e| CursorError::IoError(format!("Failed to persist temp file: {e}")))?;
            Ok(())
        })?;

        info!(
            path = %self.path.display(),
            org_id = %org_id,
            updated_since = %cursor.updated_since,
            "Last run cursor saved"
        );
        Ok(())
    }

    fn read(&self) -> Result<Option<RunCursor>, CursorError> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CursorError::IoError(e.to_string())),
        };
        if metadata.len() > MAX_CURSOR_FILE_SIZE {
            return Err(CursorError::TooLarge {
                size: metadata.len(),
                max: MAX_CURSOR_FILE_SIZE,
            });
        }

        let read_contents =
            || std::fs::read_to_string(&self.path).map_err(|e| CursorError::IoError(e.to_string()));
        // Readers never create the lock file; only writers do.
        let contents = match CursorLock::open_existing(&self.path)? {
            Some(lock) => lock.shared(read_contents)?,
            None => read_contents()?,
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| CursorError::Malformed(e.to_string()))
    }

    fn discard(&self) {
        let result = CursorLock::open(&self.path).and_then(|mut lock| {
            lock.exclusive(|| match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CursorError::IoError(e.to_string())),
            })
        });
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to delete last run cursor");
        }
    }
}

/// Parse an ISO-8601 timestamp: RFC 3339, a local date-time taken as UTC,
/// or a bare date at midnight UTC.
pub fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `2024-01-31T09:05:07.000Z`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Errors related to the last-run cursor
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),

    /// File is not a cursor record
    #[error("malformed cursor: {0}")]
    Malformed(String),

    /// Organization id is not a UUID
    #[error("invalid cursor orgid: {0}")]
    InvalidOrgId(#[from] OrgIdError),

    /// updatedSince is not ISO-8601
    #[error("invalid cursor updatedSince: {0}")]
    InvalidTimestamp(String),

    /// Cursor file too large
    #[error("cursor file too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),
}
