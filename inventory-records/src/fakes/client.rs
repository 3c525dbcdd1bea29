// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::client::{ClientError, RecordClient, RecordKind};
use crate::records::{
    AvailableCapacityRecord, DriveRecord, LogicalVolumeGroupRecord,
    VolumeRecord,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Store {
    drives: BTreeMap<String, DriveRecord>,
    volumes: BTreeMap<String, VolumeRecord>,
    capacities: BTreeMap<String, AvailableCapacityRecord>,
    lvgs: BTreeMap<String, LogicalVolumeGroupRecord>,
    failing_lists: BTreeSet<RecordKind>,
    failing_writes: BTreeSet<String>,
}

impl Store {
    fn check_list(&self, kind: RecordKind) -> Result<(), ClientError> {
        if self.failing_lists.contains(&kind) {
            return Err(ClientError::Unavailable(format!("listing {kind}")));
        }
        Ok(())
    }

    fn check_write(&self, name: &str) -> Result<(), ClientError> {
        if self.failing_writes.contains(name) {
            return Err(ClientError::Unavailable(format!("writing {name}")));
        }
        Ok(())
    }
}

/// A fake implementation of [crate::RecordClient].
///
/// Records live in memory. Listing a kind, or writing a named record, can
/// be made to fail.
#[derive(Default)]
pub struct MemoryRecordClient {
    store: Mutex<Store>,
}

impl MemoryRecordClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_drive(&self, drive: DriveRecord) {
        let mut store = self.store.lock().unwrap();
        store.drives.insert(drive.name.clone(), drive);
    }

    pub fn insert_volume(&self, volume: VolumeRecord) {
        let mut store = self.store.lock().unwrap();
        store.volumes.insert(volume.name.clone(), volume);
    }

    pub fn insert_available_capacity(&self, ac: AvailableCapacityRecord) {
        let mut store = self.store.lock().unwrap();
        store.capacities.insert(ac.name.clone(), ac);
    }

    pub fn insert_lvg(&self, lvg: LogicalVolumeGroupRecord) {
        let mut store = self.store.lock().unwrap();
        store.lvgs.insert(lvg.name.clone(), lvg);
    }

    /// Makes every subsequent list of `kind` fail.
    pub fn fail_list(&self, kind: RecordKind) {
        self.store.lock().unwrap().failing_lists.insert(kind);
    }

    /// Makes every subsequent update or delete of `name` fail.
    pub fn fail_writes_to(&self, name: &str) {
        self.store.lock().unwrap().failing_writes.insert(name.to_string());
    }

    pub fn drive(&self, name: &str) -> Option<DriveRecord> {
        self.store.lock().unwrap().drives.get(name).cloned()
    }

    pub fn volume(&self, name: &str) -> Option<VolumeRecord> {
        self.store.lock().unwrap().volumes.get(name).cloned()
    }

    pub fn available_capacity_names(&self) -> Vec<String> {
        self.store.lock().unwrap().capacities.keys().cloned().collect()
    }
}

impl RecordClient for MemoryRecordClient {
    fn list_drives(&self) -> Result<Vec<DriveRecord>, ClientError> {
        let store = self.store.lock().unwrap();
        store.check_list(RecordKind::Drive)?;
        Ok(store.drives.values().cloned().collect())
    }

    fn list_volumes(&self) -> Result<Vec<VolumeRecord>, ClientError> {
        let store = self.store.lock().unwrap();
        store.check_list(RecordKind::Volume)?;
        Ok(store.volumes.values().cloned().collect())
    }

    fn list_available_capacities(
        &self,
    ) -> Result<Vec<AvailableCapacityRecord>, ClientError> {
        let store = self.store.lock().unwrap();
        store.check_list(RecordKind::AvailableCapacity)?;
        Ok(store.capacities.values().cloned().collect())
    }

    fn list_lvgs(&self) -> Result<Vec<LogicalVolumeGroupRecord>, ClientError> {
        let store = self.store.lock().unwrap();
        store.check_list(RecordKind::LogicalVolumeGroup)?;
        Ok(store.lvgs.values().cloned().collect())
    }

    fn get_volume(&self, name: &str) -> Result<VolumeRecord, ClientError> {
        let store = self.store.lock().unwrap();
        store.volumes.get(name).cloned().ok_or_else(|| ClientError::NotFound {
            kind: RecordKind::Volume,
            name: name.to_string(),
        })
    }

    fn get_lvg(
        &self,
        name: &str,
    ) -> Result<LogicalVolumeGroupRecord, ClientError> {
        let store = self.store.lock().unwrap();
        store.lvgs.get(name).cloned().ok_or_else(|| ClientError::NotFound {
            kind: RecordKind::LogicalVolumeGroup,
            name: name.to_string(),
        })
    }

    fn update_drive(&self, drive: &DriveRecord) -> Result<(), ClientError> {
        let mut store = self.store.lock().unwrap();
        store.check_write(&drive.name)?;
        match store.drives.get_mut(&drive.name) {
            Some(existing) => {
                *existing = drive.clone();
                Ok(())
            }
            None => Err(ClientError::NotFound {
                kind: RecordKind::Drive,
                name: drive.name.clone(),
            }),
        }
    }

    fn update_volume(&self, volume: &VolumeRecord) -> Result<(), ClientError> {
        let mut store = self.store.lock().unwrap();
        store.check_write(&volume.name)?;
        match store.volumes.get_mut(&volume.name) {
            Some(existing) => {
                *existing = volume.clone();
                Ok(())
            }
            None => Err(ClientError::NotFound {
                kind: RecordKind::Volume,
                name: volume.name.clone(),
            }),
        }
    }

    fn delete_available_capacity(
        &self,
        name: &str,
    ) -> Result<(), ClientError> {
        let mut store = self.store.lock().unwrap();
        store.check_write(name)?;
        store.capacities.remove(name).map(|_| ()).ok_or_else(|| {
            ClientError::NotFound {
                kind: RecordKind::AvailableCapacity,
                name: name.to_string(),
            }
        })
    }
}
