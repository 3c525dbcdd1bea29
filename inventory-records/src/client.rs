// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The interface to the cluster store holding the records.

use crate::records::{
    AvailableCapacityRecord, DriveRecord, LogicalVolumeGroupRecord,
    VolumeRecord,
};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Drive,
    Volume,
    AvailableCapacity,
    LogicalVolumeGroup,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordKind::Drive => "drive",
            RecordKind::Volume => "volume",
            RecordKind::AvailableCapacity => "available capacity",
            RecordKind::LogicalVolumeGroup => "logical volume group",
        };
        write!(f, "{s}")
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("No {kind} record named {name}")]
    NotFound { kind: RecordKind, name: String },

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// Access to the records held by the cluster.
pub trait RecordClient: Send + Sync {
    fn list_drives(&self) -> Result<Vec<DriveRecord>, ClientError>;
    fn list_volumes(&self) -> Result<Vec<VolumeRecord>, ClientError>;
    fn list_available_capacities(
        &self,
    ) -> Result<Vec<AvailableCapacityRecord>, ClientError>;
    fn list_lvgs(&self) -> Result<Vec<LogicalVolumeGroupRecord>, ClientError>;

    fn get_volume(&self, name: &str) -> Result<VolumeRecord, ClientError>;
    fn get_lvg(
        &self,
        name: &str,
    ) -> Result<LogicalVolumeGroupRecord, ClientError>;

    fn update_drive(&self, drive: &DriveRecord) -> Result<(), ClientError>;
    fn update_volume(&self, volume: &VolumeRecord) -> Result<(), ClientError>;

    fn delete_available_capacity(&self, name: &str)
        -> Result<(), ClientError>;
}
