//! Error types for the device registry.
//!
//! Every fallible operation returns [`RegistryError`]. [`RegistryError::kind`]
//! collapses the variants into the coarse categories callers usually branch on
//! (not found, malformed snapshot, persistence failure, ...).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the device registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Malformed device snapshot at {path}: {message}")]
    MalformedSnapshot { path: PathBuf, message: String },

    // Identity errors
    #[error("Invalid device id: '{id}'")]
    InvalidId { id: String },

    // Backup errors
    #[error("Backup not found: {name}")]
    BackupNotFound { name: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Coarse classification of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    MalformedSnapshot,
    PersistenceDenied,
    PersistenceIo,
    Invalid,
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RegistryError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        RegistryError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Classify this error.
    ///
    /// IO and JSON failures count as persistence failures: reads never surface
    /// them (an unreadable snapshot is treated as absent), so the only place
    /// they reach a caller is a write.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Io { .. } | RegistryError::Json { .. } => ErrorKind::PersistenceIo,
            RegistryError::PermissionDenied(_) => ErrorKind::PersistenceDenied,
            RegistryError::MalformedSnapshot { .. } => ErrorKind::MalformedSnapshot,
            RegistryError::BackupNotFound { .. } => ErrorKind::NotFound,
            RegistryError::InvalidId { .. } | RegistryError::Validation { .. } => {
                ErrorKind::Invalid
            }
        }
    }

    /// True when the failure happened while writing the snapshot.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::PersistenceDenied | ErrorKind::PersistenceIo
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::InvalidId { id: "abc".into() };
        assert_eq!(err.to_string(), "Invalid device id: 'abc'");

        let err = RegistryError::PermissionDenied(PathBuf::from("/data/device.db"));
        assert_eq!(err.to_string(), "Permission denied: /data/device.db");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            RegistryError::MalformedSnapshot {
                path: "device.db".into(),
                message: "expected array".into(),
            }
            .kind(),
            ErrorKind::MalformedSnapshot
        );
        assert_eq!(
            RegistryError::BackupNotFound {
                name: "device.db-x.bk".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_persistence_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(RegistryError::io_with_path(io, "device.db").is_persistence_failure());
        assert!(RegistryError::PermissionDenied("device.db".into()).is_persistence_failure());
        assert!(!RegistryError::InvalidId { id: "0".into() }.is_persistence_failure());
    }
}
