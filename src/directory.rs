//! Device directory seam.
//!
//! The directory enumerates a device's signals and tags each with its
//! importance. The engine only needs lookup by name.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::signal::Device;

/// Source of device descriptions.
pub trait DeviceDirectory: Send + Sync {
    /// Look a device up by name.
    fn find_device(&self, name: &str) -> Option<Device>;
}

/// In-memory directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    devices: RwLock<HashMap<String, Device>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device description. Returns the previous one.
    pub fn insert(&self, device: Device) -> Option<Device> {
        self.devices
            .write()
            .ok()
            .and_then(|mut devices| devices.insert(device.name.clone(), device))
    }

    /// Remove a device description.
    pub fn remove(&self, name: &str) -> Option<Device> {
        self.devices.write().ok().and_then(|mut devices| devices.remove(name))
    }

    /// Number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Returns true if no device is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeviceDirectory for InMemoryDirectory {
    fn find_device(&self, name: &str) -> Option<Device> {
        self.devices.read().ok().and_then(|d| d.get(name).cloned())
    }
}
