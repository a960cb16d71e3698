//! Rolling backups of the snapshot file.
//!
//! Before a snapshot is replaced, the current file is copied next to it as
//! `<prefix><timestamp><suffix>` (by default `device.db-<timestamp>.bk`).
//! Only the newest `max_retained` of those are kept. Named backups
//! (`device.db-named-<label>.bk`) are listed alongside them but are only
//! removed on request.

use crate::config::{BackupConfig, SnapshotConfig};
use crate::error::{RegistryError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A retained backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Keeps a bounded history of prior snapshot versions.
pub trait BackupHandler: fmt::Debug {
    /// Copy `target` aside before it is overwritten.
    ///
    /// Returns `None` when there is nothing to back up.
    fn backup(&self, target: &Path) -> Result<Option<PathBuf>>;

    /// Copy `target` under an explicit label.
    fn create_named(&self, target: &Path, label: &str) -> Result<PathBuf>;

    /// All retained backups, newest first.
    fn list(&self) -> Result<Vec<BackupInfo>>;

    /// Resolve a backup name to its path.
    fn locate(&self, name: &str) -> Result<PathBuf>;

    fn delete(&self, name: &str) -> Result<()>;
}

/// Timestamped backups in a single directory with count-based retention.
#[derive(Debug, Clone)]
pub struct RollingBackups {
    dir: PathBuf,
    prefix: String,
    suffix: String,
    max_retained: usize,
}

impl RollingBackups {
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        max_retained: usize,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
            max_retained: max_retained.max(1),
        }
    }

    /// Backups stored beside `snapshot`, named after its file name.
    pub fn for_snapshot(snapshot: &Path, max_retained: usize) -> Self {
        let dir = match snapshot.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = match snapshot.file_name() {
            Some(name) if name != SnapshotConfig::DEFAULT_FILE_NAME => {
                format!("{}-", name.to_string_lossy())
            }
            _ => BackupConfig::PREFIX.to_string(),
        };
        Self::new(dir, prefix, BackupConfig::SUFFIX, max_retained)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_retained(&self) -> usize {
        self.max_retained
    }

    fn is_backup_name(&self, name: &str) -> bool {
        name.len() > self.prefix.len() + self.suffix.len()
            && name.starts_with(&self.prefix)
            && name.ends_with(&self.suffix)
            && !name.contains(['/', '\\'])
    }

    fn is_named(&self, name: &str) -> bool {
        name.strip_prefix(&self.prefix)
            .is_some_and(|rest| rest.starts_with(BackupConfig::NAMED_MARKER))
    }

    fn named_file_name(&self, label: &str) -> String {
        self.file_name(&format!("{}{}", BackupConfig::NAMED_MARKER, label))
    }

    fn file_name(&self, discriminator: &str) -> String {
        format!("{}{}{}", self.prefix, discriminator, self.suffix)
    }

    fn unused_timestamped_path(&self) -> PathBuf {
        let stamp = Utc::now().format(BackupConfig::TIMESTAMP_FORMAT).to_string();
        let mut path = self.dir.join(self.file_name(&stamp));
        let mut counter = 1;
        while path.exists() {
            path = self.dir.join(self.file_name(&format!("{}-{}", stamp, counter)));
            counter += 1;
        }
        path
    }

    fn copy_to(&self, target: &Path, backup_path: &Path) -> Result<()> {
        fs::copy(target, backup_path).map_err(|e| RegistryError::Io {
            message: format!(
                "Failed to copy {} to {}",
                target.display(),
                backup_path.display()
            ),
            path: Some(backup_path.to_path_buf()),
            source: Some(e),
        })?;
        debug!("Created backup: {}", backup_path.display());
        Ok(())
    }

    /// Delete the oldest rolling backups beyond the retention bound.
    fn prune(&self) -> Result<()> {
        let rolling = self
            .list()?
            .into_iter()
            .filter(|backup| !self.is_named(&backup.name));
        for stale in rolling.skip(self.max_retained) {
            match fs::remove_file(&stale.path) {
                Ok(()) => debug!("Pruned backup: {}", stale.name),
                Err(e) => warn!("Failed to prune backup {}: {}", stale.path.display(), e),
            }
        }
        Ok(())
    }
}

impl BackupHandler for RollingBackups {
    fn backup(&self, target: &Path) -> Result<Option<PathBuf>> {
        if !target.is_file() {
            return Ok(None);
        }
        let backup_path = self.unused_timestamped_path();
        self.copy_to(target, &backup_path)?;
        self.prune()?;
        Ok(Some(backup_path))
    }

    fn create_named(&self, target: &Path, label: &str) -> Result<PathBuf> {
        if label.trim().is_empty() || label.contains(['/', '\\']) || label.contains("..") {
            return Err(RegistryError::Validation {
                field: "label".to_string(),
                message: format!("'{}' is not a usable backup label", label),
            });
        }
        if !target.is_file() {
            return Err(RegistryError::Validation {
                field: "target".to_string(),
                message: format!("no snapshot at {} to back up", target.display()),
            });
        }

        let file_name = self.named_file_name(label);
        let backup_path = self.dir.join(&file_name);
        if backup_path.exists() {
            return Err(RegistryError::Validation {
                field: "label".to_string(),
                message: format!("backup '{}' already exists", file_name),
            });
        }
        self.copy_to(target, &backup_path)?;
        Ok(backup_path)
    }

    fn list(&self) -> Result<Vec<BackupInfo>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| RegistryError::io_with_path(e, &self.dir))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.is_backup_name(&name) {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            backups.push(BackupInfo {
                name,
                path: entry.path(),
                modified,
                size_bytes: metadata.len(),
            });
        }

        backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(backups)
    }

    fn locate(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        if self.is_backup_name(name) && path.is_file() {
            Ok(path)
        } else {
            Err(RegistryError::BackupNotFound {
                name: name.to_string(),
            })
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.locate(name)?;
        fs::remove_file(&path).map_err(|e| RegistryError::io_with_path(e, &path))?;
        debug!("Deleted backup: {}", name);
        Ok(())
    }
}
