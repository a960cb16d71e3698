//! Command definitions and dispatch.

use anyhow::{bail, Context, Result};
use bridge_devices::config::{BackupConfig, SnapshotConfig};
use bridge_devices::{DeviceRecord, DeviceRegistry};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bridge-devices")]
#[command(about = "Manage the bridge device database")]
pub struct Args {
    /// Path to the device database
    #[arg(long, global = true, default_value = SnapshotConfig::DEFAULT_FILE_NAME)]
    pub db: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Do not keep backups of replaced snapshots
    #[arg(long, global = true)]
    pub no_backups: bool,

    /// Number of rolling backups to keep
    #[arg(long, global = true, default_value_t = BackupConfig::MAX_RETAINED)]
    pub max_backups: usize,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List all devices (default)
    List,
    /// Show one device
    Show { id: String },
    /// Add a device, or replace the device with the given id
    Add {
        name: String,
        /// Device type
        #[arg(long = "type")]
        device_type: Option<String>,
        /// Replace this id instead of allocating a new one
        #[arg(long)]
        id: Option<String>,
    },
    /// Change a device's name, keeping its other fields
    Rename { id: String, name: String },
    /// Delete a device
    Delete { id: String },
    /// Reassign ids 1..n to all devices
    Renumber,
    /// List snapshot backups, newest first
    Backups,
    /// Back up the current snapshot
    Backup {
        /// Label used in the backup file name instead of a timestamp
        label: Option<String>,
    },
    /// Replace the database with a backup
    Restore { name: String },
}

/// Execute `command` and return the text to print.
pub fn run(registry: &mut DeviceRegistry, command: Command) -> Result<String> {
    match command {
        Command::List => Ok(serde_json::to_string_pretty(&registry.find_all())?),
        Command::Show { id } => {
            let record = registry
                .find_one(&id)
                .with_context(|| format!("Device not found: {}", id))?;
            Ok(serde_json::to_string_pretty(record)?)
        }
        Command::Add {
            name,
            device_type,
            id,
        } => {
            let mut record = DeviceRecord::new(name);
            record.device_type = device_type;
            if let Some(id) = id {
                record.id = id;
            }
            let stored = registry.save(vec![record])?;
            Ok(serde_json::to_string_pretty(&stored)?)
        }
        Command::Rename { id, name } => {
            let Some(mut record) = registry.find_one(&id).cloned() else {
                bail!("Device not found: {}", id);
            };
            record.name = name;
            let stored = registry.save(vec![record])?;
            Ok(serde_json::to_string_pretty(&stored)?)
        }
        Command::Delete { id } => Ok(registry.delete_by_id(&id)?.message()),
        Command::Renumber => {
            let count = registry.renumber()?;
            Ok(format!("Renumbered {} device(s)", count))
        }
        Command::Backups => Ok(registry
            .backups()?
            .iter()
            .map(|b| format!("{}\t{}\t{} bytes", b.name, b.modified.to_rfc3339(), b.size_bytes))
            .collect::<Vec<_>>()
            .join("\n")),
        Command::Backup { label } => {
            let path = registry.create_backup(label.as_deref())?;
            Ok(format!("Created backup {}", path.display()))
        }
        Command::Restore { name } => {
            let count = registry.restore_backup(&name)?;
            Ok(format!("Restored {} device(s) from {}", count, name))
        }
    }
}
