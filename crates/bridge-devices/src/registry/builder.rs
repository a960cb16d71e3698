//! Builder for configuring a [`DeviceRegistry`].

use crate::config::{MalformedPolicy, RegistryOptions};
use crate::error::Result;
use crate::registry::DeviceRegistry;
use crate::store::{BackupHandler, RollingBackups};
use std::path::PathBuf;

/// Builder for configuring a [`DeviceRegistry`].
///
/// # Example
///
/// ```rust,no_run
/// use bridge_devices::{DeviceRegistry, MalformedPolicy};
///
/// let registry = DeviceRegistry::builder("/var/lib/bridge/device.db")
///     .max_backups(5)
///     .malformed_snapshot(MalformedPolicy::StartEmpty)
///     .build()?;
/// # Ok::<(), bridge_devices::RegistryError>(())
/// ```
pub struct DeviceRegistryBuilder {
    path: PathBuf,
    options: RegistryOptions,
    backup_handler: Option<Box<dyn BackupHandler>>,
}

impl DeviceRegistryBuilder {
    /// Create a new builder for the snapshot at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: RegistryOptions::default(),
            backup_handler: None,
        }
    }

    /// Keep backups of the snapshot before each overwrite.
    ///
    /// Default: `true`
    pub fn with_backups(mut self, enable: bool) -> Self {
        self.options.backups_enabled = enable;
        self
    }

    /// Number of rolling backups to retain.
    ///
    /// Default: [`crate::config::BackupConfig::MAX_RETAINED`]
    pub fn max_backups(mut self, max: usize) -> Self {
        self.options.max_backups = max;
        self
    }

    /// How to treat a snapshot that exists but does not parse.
    ///
    /// Default: [`MalformedPolicy::Fail`]
    pub fn malformed_snapshot(mut self, policy: MalformedPolicy) -> Self {
        self.options.malformed_policy = policy;
        self
    }

    /// Use a custom backup handler instead of rolling backups beside the snapshot.
    pub fn backup_handler(mut self, handler: impl BackupHandler + 'static) -> Self {
        self.backup_handler = Some(Box::new(handler));
        self
    }

    /// Build the registry and load the snapshot.
    pub fn build(self) -> Result<DeviceRegistry> {
        let backups: Option<Box<dyn BackupHandler>> = if self.options.backups_enabled {
            Some(self.backup_handler.unwrap_or_else(|| {
                Box::new(RollingBackups::for_snapshot(
                    &self.path,
                    self.options.max_backups,
                )) as Box<dyn BackupHandler>
            }))
        } else {
            None
        };

        let mut registry = DeviceRegistry::with_parts(self.path, self.options, backups);
        registry.load()?;
        Ok(registry)
    }
}
