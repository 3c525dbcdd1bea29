// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Queries and bulk updates over the records of a node.

use crate::client::{ClientError, RecordClient, RecordKind};
use crate::records::{
    AvailableCapacityRecord, DriveRecord, LogicalVolumeGroupRecord, LvgStatus,
    OperationalStatus, VolumeRecord, VolumeSpec,
};
use drive_types::DriveStatus;
use slog::{debug, info, o, warn, Logger};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to list {kind} records: {err}")]
    List {
        kind: RecordKind,
        #[source]
        err: ClientError,
    },

    #[error("Failed to read {kind} record {name}: {err}")]
    Read {
        kind: RecordKind,
        name: String,
        #[source]
        err: ClientError,
    },

    #[error("Failed to update {kind} record {name}: {err}")]
    Update {
        kind: RecordKind,
        name: String,
        #[source]
        err: ClientError,
    },

    #[error("Failed to {operation} {} record(s)", .failures.len())]
    Bulk {
        operation: &'static str,
        failures: Vec<(String, ClientError)>,
    },

    #[error("Logical volume group {0} is still being created")]
    LvgNotReady(String),
}

impl Error {
    fn list(kind: RecordKind) -> impl FnOnce(ClientError) -> Self {
        move |err| Error::List { kind, err }
    }

    fn bulk(
        operation: &'static str,
        failures: Vec<(String, ClientError)>,
    ) -> Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Bulk { operation, failures })
        }
    }
}

/// Answers the questions controllers ask about the records of a node.
pub struct CrHelper {
    client: Arc<dyn RecordClient>,
    log: Logger,
}

impl CrHelper {
    pub fn new(client: Arc<dyn RecordClient>, log: &Logger) -> Self {
        Self { client, log: log.new(o!("component" => "CrHelper")) }
    }

    pub fn get_ac_by_location(
        &self,
        location: &str,
    ) -> Result<Option<AvailableCapacityRecord>, Error> {
        let acs = self
            .client
            .list_available_capacities()
            .map_err(Error::list(RecordKind::AvailableCapacity))?;
        Ok(acs
            .into_iter()
            .find(|ac| ac.spec.location.eq_ignore_ascii_case(location)))
    }

    /// Deletes every available capacity record of `node_id`.
    ///
    /// Each deletion is attempted even if an earlier one fails.
    pub fn delete_acs_by_node_id(&self, node_id: &str) -> Result<(), Error> {
        let acs = self
            .client
            .list_available_capacities()
            .map_err(Error::list(RecordKind::AvailableCapacity))?;
        let mut failures = Vec::new();
        for ac in acs
            .iter()
            .filter(|ac| ac.spec.node_id.eq_ignore_ascii_case(node_id))
        {
            match self.client.delete_available_capacity(&ac.name) {
                Ok(()) => {
                    debug!(
                        self.log,
                        "Deleted available capacity";
                        "name" => &ac.name,
                    );
                }
                Err(err) => {
                    warn!(
                        self.log,
                        "Failed to delete available capacity";
                        "name" => &ac.name,
                        "error" => %err,
                    );
                    failures.push((ac.name.clone(), err));
                }
            }
        }
        Error::bulk("delete available capacity", failures)
    }

    pub fn get_volume_by_location(
        &self,
        location: &str,
    ) -> Result<Option<VolumeRecord>, Error> {
        let volumes = self
            .client
            .list_volumes()
            .map_err(Error::list(RecordKind::Volume))?;
        Ok(volumes
            .into_iter()
            .find(|v| v.spec.location.eq_ignore_ascii_case(location)))
    }

    /// Sets the operational status of every volume on `node_id`, returning
    /// how many records changed.
    pub fn update_volumes_op_status_on_node(
        &self,
        node_id: &str,
        status: OperationalStatus,
    ) -> Result<usize, Error> {
        let mut updated = 0;
        let mut failures = Vec::new();
        for mut volume in self.get_volume_records(Some(node_id))? {
            if volume.spec.operational_status == status {
                continue;
            }
            volume.spec.operational_status = status;
            match self.client.update_volume(&volume) {
                Ok(()) => updated += 1,
                Err(err) => failures.push((volume.name, err)),
            }
        }
        info!(
            self.log,
            "Updated volume operational status";
            "node_id" => node_id,
            "status" => %status,
            "updated" => updated,
            "failed" => failures.len(),
        );
        Error::bulk("update volume", failures)?;
        Ok(updated)
    }

    pub fn get_volume_by_id(
        &self,
        id: &str,
    ) -> Result<Option<VolumeRecord>, Error> {
        match self.client.get_volume(id) {
            Ok(volume) => Ok(Some(volume)),
            Err(ClientError::NotFound { .. }) => Ok(None),
            Err(err) => Err(Error::Read {
                kind: RecordKind::Volume,
                name: id.to_string(),
                err,
            }),
        }
    }

    /// Lists volume records, restricted to `node_id` if given.
    pub fn get_volume_records(
        &self,
        node_id: Option<&str>,
    ) -> Result<Vec<VolumeRecord>, Error> {
        let mut volumes = self
            .client
            .list_volumes()
            .map_err(Error::list(RecordKind::Volume))?;
        if let Some(node_id) = node_id {
            volumes.retain(|v| v.spec.node_id == node_id);
        }
        Ok(volumes)
    }

    /// Sets the status of every drive on `node_id`, returning how many
    /// records changed.
    pub fn update_drives_status_on_node(
        &self,
        node_id: &str,
        status: DriveStatus,
    ) -> Result<usize, Error> {
        let mut updated = 0;
        let mut failures = Vec::new();
        for mut drive in self.get_drive_records(Some(node_id))? {
            if drive.spec.status == status {
                continue;
            }
            drive.spec.status = status;
            match self.client.update_drive(&drive) {
                Ok(()) => updated += 1,
                Err(err) => failures.push((drive.name, err)),
            }
        }
        info!(
            self.log,
            "Updated drive status";
            "node_id" => node_id,
            "status" => %status,
            "updated" => updated,
            "failed" => failures.len(),
        );
        Error::bulk("update drive", failures)?;
        Ok(updated)
    }

    /// Lists drive records, restricted to `node_id` if given.
    pub fn get_drive_records(
        &self,
        node_id: Option<&str>,
    ) -> Result<Vec<DriveRecord>, Error> {
        let mut drives = self
            .client
            .list_drives()
            .map_err(Error::list(RecordKind::Drive))?;
        if let Some(node_id) = node_id {
            drives.retain(|d| d.spec.node_id == node_id);
        }
        Ok(drives)
    }

    pub fn get_drive_record_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<Option<DriveRecord>, Error> {
        Ok(self
            .get_drive_records(None)?
            .into_iter()
            .find(|d| d.spec.uuid == uuid))
    }

    /// Returns the name of the volume group on the node backing the
    /// logical volume group record `name`.
    pub fn get_vg_name_by_lvg_name(&self, name: &str) -> Result<String, Error> {
        let lvg = self.client.get_lvg(name).map_err(|err| Error::Read {
            kind: RecordKind::LogicalVolumeGroup,
            name: name.to_string(),
            err,
        })?;
        if lvg.spec.status == LvgStatus::Creating {
            return Err(Error::LvgNotReady(name.to_string()));
        }
        Ok(lvg.spec.name)
    }

    /// Lists logical volume group records, restricted to `node_id` if given.
    pub fn get_lvg_records(
        &self,
        node_id: Option<&str>,
    ) -> Result<Vec<LogicalVolumeGroupRecord>, Error> {
        let mut lvgs = self
            .client
            .list_lvgs()
            .map_err(Error::list(RecordKind::LogicalVolumeGroup))?;
        if let Some(node_id) = node_id {
            lvgs.retain(|lvg| lvg.spec.node == node_id);
        }
        Ok(lvgs)
    }

    pub fn update_volume_spec(
        &self,
        name: &str,
        spec: VolumeSpec,
    ) -> Result<(), Error> {
        let update_err = |err| Error::Update {
            kind: RecordKind::Volume,
            name: name.to_string(),
            err,
        };
        let mut volume = self.client.get_volume(name).map_err(update_err)?;
        volume.spec = spec;
        self.client.update_volume(&volume).map_err(update_err)
    }
}
