//! Snapshot file reading and crash-safe replacement.
//!
//! Writes go to a fixed working sibling (`<name>.tmp`), are flushed and
//! synced, and are then renamed over the target in one step. A crash at any
//! point leaves either the previous snapshot or the new one in place, never
//! a missing file.

use crate::config::SnapshotConfig;
use crate::error::{RegistryError, Result};
use crate::record::DeviceRecord;
use crate::store::backup::BackupHandler;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// What a successful snapshot write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub path: PathBuf,
    pub bytes: usize,
    /// Backup of the replaced snapshot, if one was taken.
    pub backup: Option<PathBuf>,
}

/// Read the snapshot at `path`.
///
/// Returns `None` if the file is missing or cannot be read; those cases are
/// logged but are not errors. Content that is not a JSON array of device
/// records is reported as [`RegistryError::MalformedSnapshot`].
pub fn read_snapshot(path: &Path) -> Result<Option<Vec<DeviceRecord>>> {
    let source = if path.exists() {
        path.to_path_buf()
    } else {
        let legacy = legacy_old_path(path);
        if !legacy.is_file() {
            warn!(
                "Snapshot {} does not exist, starting empty",
                path.display()
            );
            return Ok(None);
        }
        warn!(
            "Snapshot {} is missing, recovering from {}",
            path.display(),
            legacy.display()
        );
        legacy
    };

    let contents = match fs::read(&source) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            warn!(
                "Snapshot {} is not readable, starting empty: {}",
                source.display(),
                e
            );
            return Ok(None);
        }
        Err(e) => {
            error!("Failed to read snapshot {}: {}", source.display(), e);
            return Ok(None);
        }
    };

    if contents.iter().all(u8::is_ascii_whitespace) {
        warn!("Snapshot {} is empty, starting empty", source.display());
        return Ok(None);
    }

    parse_snapshot(&source, &contents).map(Some)
}

/// Parse snapshot bytes read from `path`.
///
/// Invalid UTF-8 is malformed content, not an unreadable file.
pub fn parse_snapshot(path: &Path, contents: &[u8]) -> Result<Vec<DeviceRecord>> {
    serde_json::from_slice(contents).map_err(|e| RegistryError::MalformedSnapshot {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Replace the snapshot at `path` with `records`.
///
/// The previous snapshot is handed to `backups` before it is replaced. Backup
/// and directory-creation failures are logged and do not stop the write.
pub fn write_snapshot<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a DeviceRecord>,
    backups: Option<&dyn BackupHandler>,
) -> Result<PersistOutcome> {
    if let Ok(metadata) = fs::metadata(path) {
        if metadata.permissions().readonly() {
            return Err(RegistryError::PermissionDenied(path.to_path_buf()));
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create directory {}: {}", parent.display(), e);
            }
        }
    }

    let records: Vec<&DeviceRecord> = records.into_iter().collect();
    let serialized = serde_json::to_string_pretty(&records).map_err(|e| RegistryError::Json {
        message: format!("Failed to serialize snapshot: {}", e),
        source: Some(e),
    })?;

    let working = working_path(path);
    if let Err(e) = write_synced(&working, serialized.as_bytes()) {
        discard(&working);
        return Err(RegistryError::Io {
            message: format!("Failed to write {}", working.display()),
            path: Some(working),
            source: Some(e),
        });
    }

    let backup = match backups {
        Some(handler) if path.exists() => match handler.backup(path) {
            Ok(backup) => backup,
            Err(e) => {
                warn!("Failed to back up {}: {}", path.display(), e);
                None
            }
        },
        _ => None,
    };

    if let Err(e) = fs::rename(&working, path) {
        discard(&working);
        return Err(RegistryError::Io {
            message: format!("Failed to rename {} to {}", working.display(), path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    // A leftover from the rename-aside protocol is stale once the new snapshot is in place.
    let legacy = legacy_old_path(path);
    if legacy.exists() {
        if let Err(e) = fs::remove_file(&legacy) {
            warn!("Failed to remove stale {}: {}", legacy.display(), e);
        }
    }

    debug!(
        "Wrote {} device(s) to {}",
        records.len(),
        path.display()
    );
    Ok(PersistOutcome {
        path: path.to_path_buf(),
        bytes: serialized.len(),
        backup,
    })
}

/// Fixed sibling used as the write target before the rename.
pub fn working_path(path: &Path) -> PathBuf {
    sibling(path, SnapshotConfig::WORKING_FILE_SUFFIX)
}

/// Sibling the rename-aside protocol moved the old snapshot to.
pub fn legacy_old_path(path: &Path) -> PathBuf {
    sibling(path, SnapshotConfig::LEGACY_OLD_FILE_SUFFIX)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| SnapshotConfig::DEFAULT_FILE_NAME.to_string());
    path.with_file_name(format!("{}{}", file_name, suffix))
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}

fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove working file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backup::RollingBackups;
    use tempfile::TempDir;

    fn lamp(id: &str) -> DeviceRecord {
        DeviceRecord::new("Lamp").with_id(id)
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");
        let records = vec![lamp("1"), lamp("2")];

        let outcome = write_snapshot(&path, &records, None).unwrap();
        assert_eq!(outcome.path, path);
        assert!(outcome.bytes > 0);
        assert!(outcome.backup.is_none());
        assert!(!working_path(&path).exists());

        let read = read_snapshot(&path).unwrap();
        assert_eq!(read, Some(records));
    }

    #[test]
    fn test_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");

        assert!(read_snapshot(&path).unwrap().is_none());
    }

    #[test]
    fn test_read_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");
        fs::write(&path, "  \n").unwrap();

        assert!(read_snapshot(&path).unwrap().is_none());
    }

    #[test]
    fn test_read_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");
        fs::write(&path, r#"{"id": "1"}"#).unwrap();

        let err = read_snapshot(&path).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedSnapshot { .. }));
    }

    #[test]
    fn test_read_invalid_utf8_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");
        fs::write(&path, b"[{\"id\":\"1\",\"name\":\"\xff\xfe\"}]").unwrap();

        let err = read_snapshot(&path).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedSnapshot { .. }));
    }

    #[test]
    fn test_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("data").join("device.db");

        write_snapshot(&path, &[lamp("1")], None).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_backs_up_previous_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");
        let backups = RollingBackups::for_snapshot(&path, 5);

        let first = write_snapshot(&path, &[lamp("1")], Some(&backups)).unwrap();
        assert!(first.backup.is_none());

        let second = write_snapshot(&path, &[lamp("1"), lamp("2")], Some(&backups)).unwrap();
        let backup = second.backup.unwrap();
        let saved = parse_snapshot(&backup, &fs::read(&backup).unwrap()).unwrap();
        assert_eq!(saved, vec![lamp("1")]);
    }

    #[test]
    fn test_recovers_from_legacy_old_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");
        let legacy = legacy_old_path(&path);
        fs::write(&legacy, serde_json::to_string(&vec![lamp("4")]).unwrap()).unwrap();

        let read = read_snapshot(&path).unwrap().unwrap();
        assert_eq!(read[0].id, "4");

        write_snapshot(&path, &read, None).unwrap();
        assert!(path.exists());
        assert!(!legacy.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_refuses_read_only_target() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");
        write_snapshot(&path, &[lamp("1")], None).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();

        let err = write_snapshot(&path, &[lamp("2")], None).unwrap_err();
        assert!(matches!(err, RegistryError::PermissionDenied(_)));
        assert_eq!(read_snapshot(&path).unwrap(), Some(vec![lamp("1")]));
    }
}
