//! In-memory device registry backed by a JSON snapshot.

use crate::config::{IdentityConfig, MalformedPolicy, RegistryOptions};
use crate::error::{RegistryError, Result};
use crate::identity::{next_id_after, parse_id, unique_id_for};
use crate::record::DeviceRecord;
use crate::registry::builder::DeviceRegistryBuilder;
use crate::store::{
    parse_snapshot, read_snapshot, write_snapshot, BackupHandler, BackupInfo, PersistOutcome,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Result of [`DeviceRegistry::delete`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted { id: String, record: DeviceRecord },
    NotFound,
}

impl DeleteOutcome {
    /// Human-readable confirmation for API responses.
    pub fn message(&self) -> String {
        match self {
            DeleteOutcome::Deleted { id, .. } => format!("Device with id '{}' deleted", id),
            DeleteOutcome::NotFound => "Device not found".to_string(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted { .. })
    }
}

/// Registry of bridged devices.
///
/// Every mutation rewrites the whole snapshot. The in-memory change is applied
/// first and kept even when the write fails; the write failure is logged and
/// returned so the caller can decide what to do.
///
/// The registry has a single owner: mutating methods take `&mut self` and no
/// locking is done. Callers sharing it between request handlers must
/// serialize access themselves (e.g. behind a `Mutex`).
#[derive(Debug)]
pub struct DeviceRegistry {
    path: PathBuf,
    records: BTreeMap<u32, DeviceRecord>,
    /// Kept as u64 so allocating `u32::MAX` cannot overflow the counter.
    next_id: u64,
    backups: Option<Box<dyn BackupHandler>>,
    options: RegistryOptions,
}

impl DeviceRegistry {
    /// Open the registry at `path` with default options.
    ///
    /// A missing or unreadable snapshot yields an empty registry. A snapshot
    /// that does not parse fails with [`RegistryError::MalformedSnapshot`].
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(path).build()
    }

    pub fn builder(path: impl Into<PathBuf>) -> DeviceRegistryBuilder {
        DeviceRegistryBuilder::new(path)
    }

    pub(crate) fn with_parts(
        path: PathBuf,
        options: RegistryOptions,
        backups: Option<Box<dyn BackupHandler>>,
    ) -> Self {
        Self {
            path,
            records: BTreeMap::new(),
            next_id: u64::from(IdentityConfig::FIRST_ID),
            backups,
            options,
        }
    }

    /// Reload the snapshot from disk, replacing the in-memory records.
    ///
    /// Returns the number of records loaded.
    pub fn load(&mut self) -> Result<usize> {
        let loaded = match read_snapshot(&self.path).and_then(|records| {
            index_records(&self.path, records.unwrap_or_default())
        }) {
            Ok(records) => records,
            Err(e @ RegistryError::MalformedSnapshot { .. })
                if self.options.malformed_policy == MalformedPolicy::StartEmpty =>
            {
                warn!("{}; starting with an empty registry", e);
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        self.records = loaded;
        self.next_id = u64::from(next_id_after(self.records.keys().copied()));
        debug!(
            "Loaded {} device(s) from {}, next id {}",
            self.records.len(),
            self.path.display(),
            self.next_id
        );
        Ok(self.records.len())
    }

    /// All devices, in ascending id order.
    pub fn find_all(&self) -> Vec<DeviceRecord> {
        self.records.values().cloned().collect()
    }

    /// All devices. The type filter is accepted but not applied.
    pub fn find_by_type(&self, _device_type: &str) -> Vec<DeviceRecord> {
        self.find_all()
    }

    pub fn find_one(&self, id: &str) -> Option<&DeviceRecord> {
        let id = parse_id(id).ok()?;
        self.records.get(&id)
    }

    /// Insert or replace a batch of devices, then persist the snapshot.
    ///
    /// Records with an id replace the stored record wholesale; records without
    /// one get the next free id. Empty unique ids are synthesized from the id.
    /// Returns the records as stored.
    pub fn save(&mut self, records: Vec<DeviceRecord>) -> Result<Vec<DeviceRecord>> {
        // Reject the whole batch before touching anything.
        let explicit_ids = records
            .iter()
            .map(|record| record.has_id().then(|| parse_id(&record.id)).transpose())
            .collect::<Result<Vec<_>>>()?;
        let (ids, next_id) = self.reserve_ids(&explicit_ids)?;

        let mut stored = Vec::with_capacity(records.len());
        for (mut record, id) in records.into_iter().zip(ids) {
            self.records.remove(&id);
            record.id = id.to_string();
            if record.unique_id.is_empty() {
                record.unique_id = unique_id_for(id);
            }
            self.records.insert(id, record.clone());
            stored.push(record);
        }
        self.next_id = next_id;

        for (id, record) in self.records.iter_mut() {
            if record.unique_id.is_empty() {
                record.unique_id = unique_id_for(*id);
            }
        }

        self.persist()?;
        debug!(
            "Saved device(s): {}",
            stored
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(stored)
    }

    /// Remove a device and persist the snapshot.
    ///
    /// `None`, or a record this registry does not hold, yields
    /// [`DeleteOutcome::NotFound`] without writing anything.
    pub fn delete(&mut self, record: Option<&DeviceRecord>) -> Result<DeleteOutcome> {
        let Some(id) = record.and_then(|r| parse_id(&r.id).ok()) else {
            return Ok(DeleteOutcome::NotFound);
        };
        let Some(removed) = self.records.remove(&id) else {
            return Ok(DeleteOutcome::NotFound);
        };

        self.persist()?;
        debug!("Deleted device {} ({})", removed.id, removed.name);
        Ok(DeleteOutcome::Deleted {
            id: removed.id.clone(),
            record: removed,
        })
    }

    /// [`Self::delete`] by id.
    pub fn delete_by_id(&mut self, id: &str) -> Result<DeleteOutcome> {
        let record = self.find_one(id).cloned();
        self.delete(record.as_ref())
    }

    /// Reassign ids `1..=n` in ascending order of the current ids and
    /// regenerate every unique id, then persist the snapshot.
    ///
    /// Returns the number of devices renumbered.
    pub fn renumber(&mut self) -> Result<usize> {
        let previous = std::mem::take(&mut self.records);
        let mut next = IdentityConfig::FIRST_ID;
        for mut record in previous.into_values() {
            record.id = next.to_string();
            record.unique_id = unique_id_for(next);
            self.records.insert(next, record);
            next += 1;
        }
        self.next_id = u64::from(next);

        info!("Renumbered {} device(s)", self.records.len());
        self.persist()?;
        Ok(self.records.len())
    }

    /// Backups of this registry's snapshot, newest first.
    pub fn backups(&self) -> Result<Vec<BackupInfo>> {
        match &self.backups {
            Some(handler) => handler.list(),
            None => Ok(Vec::new()),
        }
    }

    /// Back up the current snapshot, under `label` if given.
    pub fn create_backup(&self, label: Option<&str>) -> Result<PathBuf> {
        let handler = self.backup_handler()?;
        match label {
            Some(label) => handler.create_named(&self.path, label),
            None => handler
                .backup(&self.path)?
                .ok_or_else(|| RegistryError::Validation {
                    field: "path".to_string(),
                    message: format!("no snapshot at {} to back up", self.path.display()),
                }),
        }
    }

    pub fn delete_backup(&self, name: &str) -> Result<()> {
        self.backup_handler()?.delete(name)
    }

    /// Replace the registry contents with a backup and persist them.
    ///
    /// The snapshot being replaced is itself backed up first. Returns the
    /// number of devices restored.
    pub fn restore_backup(&mut self, name: &str) -> Result<usize> {
        let backup_path = self.backup_handler()?.locate(name)?;
        let contents = fs::read(&backup_path)
            .map_err(|e| RegistryError::io_with_path(e, &backup_path))?;
        let restored = index_records(&backup_path, parse_snapshot(&backup_path, &contents)?)?;

        self.records = restored;
        self.next_id = u64::from(next_id_after(self.records.keys().copied()));
        self.persist()?;
        info!("Restored {} device(s) from {}", self.records.len(), name);
        Ok(self.records.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The id the next record without one will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Final ids for a batch, and the counter after it. Allocation runs
    /// against a copy of the counter so a failure leaves `self` untouched.
    fn reserve_ids(&self, explicit_ids: &[Option<u32>]) -> Result<(Vec<u32>, u64)> {
        let mut next_id = self.next_id;
        let mut ids = Vec::with_capacity(explicit_ids.len());
        for explicit in explicit_ids {
            let id = match explicit {
                Some(id) => *id,
                None => u32::try_from(next_id).map_err(|_| RegistryError::Validation {
                    field: "id".to_string(),
                    message: "device id space exhausted".to_string(),
                })?,
            };
            next_id = next_id.max(u64::from(id) + 1);
            ids.push(id);
        }
        Ok((ids, next_id))
    }

    fn backup_handler(&self) -> Result<&dyn BackupHandler> {
        self.backups
            .as_deref()
            .ok_or_else(|| RegistryError::Validation {
                field: "backups".to_string(),
                message: "backups are disabled for this registry".to_string(),
            })
    }

    fn persist(&self) -> Result<PersistOutcome> {
        write_snapshot(&self.path, self.records.values(), self.backups.as_deref()).map_err(|e| {
            error!(
                "Failed to persist device snapshot {}: {}",
                self.path.display(),
                e
            );
            e
        })
    }
}

/// Key parsed records by numeric id, normalizing the id text.
fn index_records(path: &Path, records: Vec<DeviceRecord>) -> Result<BTreeMap<u32, DeviceRecord>> {
    let mut indexed = BTreeMap::new();
    for mut record in records {
        let id = parse_id(&record.id).map_err(|_| RegistryError::MalformedSnapshot {
            path: path.to_path_buf(),
            message: format!("device '{}' has invalid id '{}'", record.name, record.id),
        })?;
        record.id = id.to_string();
        if indexed.insert(id, record).is_some() {
            warn!("Duplicate device id {} in {}, keeping the last", id, path.display());
        }
    }
    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_registry() -> (TempDir, DeviceRegistry) {
        let temp_dir = TempDir::new().unwrap();
        let registry = DeviceRegistry::new(temp_dir.path().join("device.db")).unwrap();
        (temp_dir, registry)
    }

    #[test]
    fn test_save_assigns_sequential_ids() {
        let (_temp, mut registry) = setup_registry();

        let stored = registry
            .save(vec![DeviceRecord::new("Lamp"), DeviceRecord::new("Fan")])
            .unwrap();

        assert_eq!(stored[0].id, "1");
        assert_eq!(stored[1].id, "2");
        assert_eq!(stored[1].unique_id, "00:17:88:5E:D3:02-02");
        assert_eq!(registry.next_id(), 3);
    }

    #[test]
    fn test_explicit_id_moves_counter_past_it() {
        let (_temp, mut registry) = setup_registry();

        registry.save(vec![DeviceRecord::new("Porch").with_id("10")]).unwrap();
        let stored = registry.save(vec![DeviceRecord::new("Hall")]).unwrap();

        assert_eq!(stored[0].id, "11");
    }

    #[test]
    fn test_invalid_id_rejects_whole_batch() {
        let (temp, mut registry) = setup_registry();

        let err = registry
            .save(vec![
                DeviceRecord::new("Good"),
                DeviceRecord::new("Bad").with_id("lamp"),
            ])
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidId { .. }));
        assert!(registry.is_empty());
        assert_eq!(registry.next_id(), 1);
        assert!(!temp.path().join("device.db").exists());
    }

    #[test]
    fn test_exhausted_id_space_rejects_whole_batch() {
        let (temp, mut registry) = setup_registry();
        registry
            .save(vec![DeviceRecord::new("Last").with_id((u32::MAX - 1).to_string())])
            .unwrap();
        assert_eq!(registry.next_id(), u64::from(u32::MAX));

        let err = registry
            .save(vec![DeviceRecord::new("Fits"), DeviceRecord::new("Overflows")])
            .unwrap_err();

        assert!(matches!(err, RegistryError::Validation { .. }));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.next_id(), u64::from(u32::MAX));
        let on_disk = fs::read_to_string(temp.path().join("device.db")).unwrap();
        assert!(!on_disk.contains("Fits"));
    }

    #[test]
    fn test_ids_are_normalized() {
        let (_temp, mut registry) = setup_registry();

        registry.save(vec![DeviceRecord::new("Lamp").with_id("007")]).unwrap();

        assert_eq!(registry.find_one("7").unwrap().id, "7");
        assert_eq!(registry.find_one("007").unwrap().name, "Lamp");
    }

    #[test]
    fn test_find_by_type_ignores_filter() {
        let (_temp, mut registry) = setup_registry();
        registry
            .save(vec![
                DeviceRecord::new("Lamp").with_device_type("switch"),
                DeviceRecord::new("TV").with_device_type("media"),
            ])
            .unwrap();

        assert_eq!(registry.find_by_type("switch"), registry.find_all());
        assert_eq!(registry.find_by_type("nothing").len(), 2);
    }

    #[test]
    fn test_delete_outcome_messages() {
        let (_temp, mut registry) = setup_registry();
        registry.save(vec![DeviceRecord::new("Lamp")]).unwrap();

        let outcome = registry.delete_by_id("1").unwrap();
        assert!(outcome.is_deleted());
        assert_eq!(outcome.message(), "Device with id '1' deleted");

        let outcome = registry.delete_by_id("1").unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
        assert_eq!(outcome.message(), "Device not found");
    }

    #[test]
    fn test_renumber_closes_gaps() {
        let (_temp, mut registry) = setup_registry();
        registry
            .save(vec![
                DeviceRecord::new("A").with_id("4"),
                DeviceRecord::new("B").with_id("9"),
                DeviceRecord::new("C").with_id("2"),
            ])
            .unwrap();

        assert_eq!(registry.renumber().unwrap(), 3);

        let names: Vec<_> = registry
            .find_all()
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();
        assert_eq!(
            names,
            vec![
                ("1".to_string(), "C".to_string()),
                ("2".to_string(), "A".to_string()),
                ("3".to_string(), "B".to_string()),
            ]
        );
        assert_eq!(registry.next_id(), 4);
    }

    #[test]
    fn test_loaded_records_without_unique_id_get_one_on_save() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");
        fs::write(&path, r#"[{"id": "3", "name": "Old"}]"#).unwrap();

        let mut registry = DeviceRegistry::new(&path).unwrap();
        assert!(registry.find_one("3").unwrap().unique_id.is_empty());

        registry.save(vec![DeviceRecord::new("New")]).unwrap();
        assert_eq!(
            registry.find_one("3").unwrap().unique_id,
            "00:17:88:5E:D3:03-03"
        );
        assert_eq!(registry.find_one("4").unwrap().name, "New");
    }

    #[test]
    fn test_invalid_id_in_snapshot_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("device.db");
        fs::write(&path, r#"[{"id": "kitchen", "name": "Old"}]"#).unwrap();

        let err = DeviceRegistry::new(&path).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedSnapshot { .. }));
    }

    #[test]
    fn test_backups_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = DeviceRegistry::builder(temp_dir.path().join("device.db"))
            .with_backups(false)
            .build()
            .unwrap();

        registry.save(vec![DeviceRecord::new("Lamp")]).unwrap();
        registry.save(vec![DeviceRecord::new("Fan")]).unwrap();

        assert!(registry.backups().unwrap().is_empty());
        assert!(registry.create_backup(None).is_err());
    }
}
