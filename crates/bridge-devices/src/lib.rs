//! Bridge Devices - persistent registry of bridged home-automation devices.
//!
//! Device records live in memory and are written as a single JSON array to a
//! snapshot file after every change. The registry assigns numeric ids and
//! synthesizes a pseudo hardware address (`uniqueid`) for each device.
//!
//! # Example
//!
//! ```rust,no_run
//! use bridge_devices::{DeviceRecord, DeviceRegistry};
//!
//! fn main() -> bridge_devices::Result<()> {
//!     let mut registry = DeviceRegistry::new("data/device.db")?;
//!
//!     let stored = registry.save(vec![DeviceRecord::new("Porch light")])?;
//!     println!("{} -> {}", stored[0].id, stored[0].unique_id);
//!
//!     for device in registry.find_all() {
//!         println!("{}: {}", device.id, device.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Errors
//!
//! Only construction and [`DeviceRegistry::load`] fail on a bad snapshot
//! ([`RegistryError::MalformedSnapshot`]); a missing or unreadable snapshot
//! is an empty registry. Mutations (`save`, `delete`, `renumber`) keep their
//! in-memory effect when the snapshot write fails and return the write error.

pub mod config;
pub mod error;
pub mod identity;
pub mod record;
pub mod registry;
pub mod store;

pub use config::{MalformedPolicy, RegistryOptions};
pub use error::{ErrorKind, RegistryError, Result};
pub use identity::unique_id_for;
pub use record::DeviceRecord;
pub use registry::{DeleteOutcome, DeviceRegistry, DeviceRegistryBuilder};
pub use store::{BackupHandler, BackupInfo, PersistOutcome, RollingBackups};
