//! Read-only snapshots of delivery types and drivers.
//!
//! The core never reaches for shared state: callers take a snapshot of
//! the registry and pass it in explicitly.  The snapshot can therefore
//! change between invocations without affecting results already
//! computed.  Seed data is loaded from a directory of JSON files.

use crate::models::{DeliveryType, Driver};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Snapshot of known delivery types, in registry order.
#[derive(Debug, Clone, Default)]
pub struct DeliveryTypeRegistry {
    types: Vec<DeliveryType>,
}

impl DeliveryTypeRegistry {
    pub fn new(types: Vec<DeliveryType>) -> Self {
        Self { types }
    }

    /// Types that have not been soft-deleted, in registry order.
    pub fn active(&self) -> impl Iterator<Item = &DeliveryType> {
        self.types.iter().filter(|t| t.active)
    }

    pub fn active_names(&self) -> Vec<String> {
        self.active().map(|t| t.name.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&DeliveryType> {
        self.types.iter().find(|t| t.id == id)
    }
}

/// Snapshot of registered drivers.
#[derive(Debug, Clone, Default)]
pub struct DriverDirectory {
    drivers: Vec<Driver>,
}

impl DriverDirectory {
    pub fn new(drivers: Vec<Driver>) -> Self {
        Self { drivers }
    }

    pub fn get(&self, id: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id == id)
    }

    /// Resolves a chat sender to a driver through the linked LINE id.
    pub fn find_by_line_user_id(&self, line_user_id: &str) -> Option<&Driver> {
        self.drivers
            .iter()
            .find(|d| d.line_user_id.as_deref() == Some(line_user_id))
    }

    /// Links a driver to a LINE user id.  Returns `false` when the
    /// driver is unknown.
    pub fn link_line_user(&mut self, driver_id: &str, line_user_id: &str) -> bool {
        match self.drivers.iter_mut().find(|d| d.id == driver_id) {
            Some(driver) => {
                driver.line_user_id = Some(line_user_id.to_string());
                true
            }
            None => false,
        }
    }
}

/// Contents of one seed file.  Either list may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub delivery_types: Vec<DeliveryType>,
    pub drivers: Vec<Driver>,
}

impl SeedFile {
    fn merge(&mut self, other: SeedFile) {
        self.delivery_types.extend(other.delivery_types);
        self.drivers.extend(other.drivers);
    }
}

/// Load seed data from every `.json` file in a directory.
///
/// Files are read in name order and their lists concatenated.  Files
/// that fail to parse are skipped with a warning; a missing directory
/// yields an empty seed.
pub fn load_seed_from_dir(path: &Path) -> Result<SeedFile> {
    let mut seed = SeedFile::default();
    if !path.is_dir() {
        tracing::info!(dir = %path.display(), "seed directory not found, starting empty");
        return Ok(seed);
    }
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file()
            && entry.path().extension().is_some_and(|ext| ext == "json")
        {
            entries.push(entry.path());
        }
    }
    entries.sort();
    for file in entries {
        let data = std::fs::read_to_string(&file)?;
        match serde_json::from_str::<SeedFile>(&data) {
            Ok(parsed) => seed.merge(parsed),
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "failed to parse seed file");
            }
        }
    }
    Ok(seed)
}
