//! The device registry.
//!
//! An in-memory map of device id to [`crate::DeviceRecord`], loaded from a
//! JSON snapshot at construction and rewritten in full after every mutation.
//!
//! # Files
//!
//! Next to the snapshot (default `device.db`) the registry uses:
//! - `device.db.tmp`: the new snapshot while it is being written
//! - `device.db-<timestamp>.bk`: rolling backups of replaced snapshots
//! - `device.db.old`: only read, to recover from a crash of the older
//!   rename-aside writer

mod builder;
mod device_registry;

pub use builder::DeviceRegistryBuilder;
pub use device_registry::{DeleteOutcome, DeviceRegistry};
