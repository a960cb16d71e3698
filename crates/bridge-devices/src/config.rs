//! Centralized configuration for the device registry.
//!
//! Constants for snapshot file naming, backup retention and identifier
//! synthesis, plus the runtime [`RegistryOptions`] assembled by
//! [`crate::DeviceRegistryBuilder`].

/// Snapshot file naming.
pub struct SnapshotConfig;

impl SnapshotConfig {
    pub const DEFAULT_FILE_NAME: &'static str = "device.db";
    /// Sibling the new snapshot is written to before being renamed into place.
    pub const WORKING_FILE_SUFFIX: &'static str = ".tmp";
    /// Sibling left behind by the older rename-aside write protocol.
    pub const LEGACY_OLD_FILE_SUFFIX: &'static str = ".old";
}

/// Backup naming and retention.
pub struct BackupConfig;

impl BackupConfig {
    pub const SUFFIX: &'static str = ".bk";
    pub const PREFIX: &'static str = "device.db-";
    pub const MAX_RETAINED: usize = 10;
    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%dT%H-%M-%S%.9f";
    /// Marks user-requested backups, which rolling retention never prunes.
    pub const NAMED_MARKER: &'static str = "named-";
}

/// Identifier allocation.
pub struct IdentityConfig;

impl IdentityConfig {
    /// Fixed vendor prefix of every synthesized unique id.
    pub const UNIQUE_ID_PREFIX: &'static str = "00:17:88:5E:D3:";
    pub const FIRST_ID: u32 = 1;
}

/// What to do when the snapshot exists but cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Propagate [`crate::RegistryError::MalformedSnapshot`] to the caller.
    #[default]
    Fail,
    /// Log a warning and start with an empty registry. The file is left as-is
    /// until the next write replaces it.
    StartEmpty,
}

/// Runtime options for a [`crate::DeviceRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Keep rolling backups of the snapshot before each overwrite.
    pub backups_enabled: bool,
    /// Upper bound on retained backups.
    pub max_backups: usize,
    pub malformed_policy: MalformedPolicy,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            backups_enabled: true,
            max_backups: BackupConfig::MAX_RETAINED,
            malformed_policy: MalformedPolicy::default(),
        }
    }
}
