//! Advisory locking of the cursor file using fd-lock
//!
//! The lock lives in a sibling `<name>.lock` file so the cursor itself can be
//! replaced atomically while the lock is held.

use super::cursor::CursorError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock guarding one cursor file
pub struct CursorLock {
    lock: RwLock<File>,
}

impl CursorLock {
    /// Open (creating if needed) the lock file that guards `path`.
    pub fn open(path: &Path) -> Result<Self, CursorError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CursorError::IoError(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(path))
            .map_err(|e| CursorError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            lock: RwLock::new(file),
        })
    }

    /// Open the lock file guarding `path` only if a writer already created it.
    pub fn open_existing(path: &Path) -> Result<Option<Self>, CursorError> {
        match OpenOptions::new().read(true).write(true).open(lock_path(path)) {
            Ok(file) => Ok(Some(Self {
                lock: RwLock::new(file),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CursorError::LockError(format!("Failed to open lock file: {e}"))),
        }
    }

    /// Run `f` while holding the exclusive lock. Blocks until available.
    pub fn exclusive<T>(
        &mut self,
        f: impl FnOnce() -> Result<T, CursorError>,
    ) -> Result<T, CursorError> {
        let _guard = self
            .lock
            .write()
            .map_err(|e| CursorError::LockError(format!("Failed to acquire write lock: {e}")))?;
        f()
    }

    /// Run `f` while holding a shared lock. Blocks until available.
    pub fn shared<T>(&self, f: impl FnOnce() -> Result<T, CursorError>) -> Result<T, CursorError> {
        let _guard = self
            .lock
            .read()
            .map_err(|e| CursorError::LockError(format!("Failed to acquire read lock: {e}")))?;
        f()
    }
}

/// `lastrun.json` -> `lastrun.lock`
pub fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("lock")
}
