// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The list of virtual devices a manager is tracking.

use crate::device::{serial_key, VirtualDevice, SERIAL_PREFIX};
use uuid::Uuid;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Serial number must not be empty")]
    EmptySerial,

    #[error("Serial number {new} conflicts with tracked device {existing}")]
    DuplicateSerial { new: String, existing: String },
}

/// Tracked devices, in the order they were added.
///
/// No two devices share a [serial_key].
#[derive(Clone, Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<VirtualDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn position(&self, serial: &str) -> Option<usize> {
        let key = serial_key(serial);
        self.devices.iter().position(|device| device.key() == key)
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.position(serial).is_some()
    }

    pub fn get(&self, serial: &str) -> Option<&VirtualDevice> {
        self.position(serial).map(|index| &self.devices[index])
    }

    pub fn get_mut(&mut self, serial: &str) -> Option<&mut VirtualDevice> {
        let index = self.position(serial)?;
        self.devices.get_mut(index)
    }

    pub fn get_index_mut(
        &mut self,
        index: usize,
    ) -> Option<&mut VirtualDevice> {
        self.devices.get_mut(index)
    }

    pub fn push(&mut self, device: VirtualDevice) -> Result<(), RegistryError> {
        if device.serial_number.is_empty() {
            return Err(RegistryError::EmptySerial);
        }
        if let Some(existing) = self.get(&device.serial_number) {
            return Err(RegistryError::DuplicateSerial {
                new: device.serial_number,
                existing: existing.serial_number.clone(),
            });
        }
        self.devices.push(device);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> VirtualDevice {
        self.devices.remove(index)
    }

    /// Keeps only the devices for which `f` returns true.
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&VirtualDevice) -> bool,
    {
        self.devices.retain(f)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualDevice> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VirtualDevice> {
        self.devices.iter_mut()
    }

    /// Picks a serial number for a new device of `hostname`.
    ///
    /// Candidates are derived from the hostname and an increasing index, so
    /// the same registry always yields the same serial. A candidate is
    /// skipped if a tracked device already has it or `reserved` claims it.
    pub fn next_free_serial<F>(&self, hostname: &str, reserved: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        (0u64..)
            .map(|index| generate_serial(hostname, index))
            .find(|serial| !self.contains(serial) && !reserved(serial))
            .unwrap_or_default()
    }
}

/// `LOOPBACK` followed by 16 hex digits of a name-based UUID.
pub fn generate_serial(hostname: &str, index: u64) -> String {
    let name = format!("{hostname}/{index}");
    let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes());
    let hex = uuid.simple().to_string().to_uppercase();
    format!("{SERIAL_PREFIX}{}", &hex[..16])
}
