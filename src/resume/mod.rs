//! Incremental re-runs
//!
//! Persists the start time of the last fully successful run, with atomic
//! writes and file locking.

pub mod cursor;
pub mod lock;

pub use cursor::{CursorError, CursorStatus, CursorStore, RunCursor};
pub use lock::CursorLock;
