//! The persisted device record.

use crate::error::Result;
use crate::identity::parse_id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A bridged device as stored in the snapshot.
///
/// Only the identity fields are interpreted by the registry. Any other JSON
/// field found in the snapshot is kept in `attributes` and written back as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Decimal positive integer; empty until the registry assigns one.
    #[serde(default)]
    pub id: String,
    /// Pseudo hardware address; synthesized from `id` when empty.
    #[serde(rename = "uniqueid", default)]
    pub unique_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(
        rename = "deviceType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub device_type: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl DeviceRecord {
    /// A new, unsaved record with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether the record already carries an id.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// The id as a number.
    pub fn numeric_id(&self) -> Result<u32> {
        parse_id(&self.id)
    }
}
