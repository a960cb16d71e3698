//! Snapshot persistence.
//!
//! This module provides:
//! - Reading the JSON snapshot with missing/unreadable tolerance
//! - Crash-safe snapshot replacement (write working file, then rename)
//! - Rolling timestamped backups of replaced snapshots

mod backup;
mod snapshot;

pub use backup::{BackupHandler, BackupInfo, RollingBackups};
pub use snapshot::{
    legacy_old_path, parse_snapshot, read_snapshot, working_path, write_snapshot, PersistOutcome,
};
