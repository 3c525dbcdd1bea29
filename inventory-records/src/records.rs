// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The record types stored in the cluster.

use drive_types::{DriveDescriptor, DriveHealth, DriveStatus, DriveType};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Namespace for drive record UUIDs derived from node and serial number.
const DRIVE_UUID_NAMESPACE: Uuid =
    Uuid::from_u128(0x5ee1_4b7e_0c07_4d1a_9a43_96d2_7b3f_1e58);

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct DriveSpec {
    pub uuid: String,
    pub serial_number: String,
    pub vendor_id: String,
    pub product_id: String,
    pub size_bytes: u64,
    pub health: DriveHealth,
    pub drive_type: DriveType,
    pub status: DriveStatus,
    pub node_id: String,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct DriveRecord {
    pub name: String,
    pub spec: DriveSpec,
}

impl DriveRecord {
    /// Builds the record publishing `drive` for `node_id`.
    ///
    /// The record is named by a UUID derived from the node and the serial
    /// number, so republishing the same drive yields the same name.
    pub fn from_descriptor(node_id: &str, drive: &DriveDescriptor) -> Self {
        let uuid = Uuid::new_v5(
            &DRIVE_UUID_NAMESPACE,
            format!("{node_id}/{}", drive.serial_number).as_bytes(),
        )
        .to_string();
        Self {
            name: uuid.clone(),
            spec: DriveSpec {
                uuid,
                serial_number: drive.serial_number.clone(),
                vendor_id: drive.vendor_id.clone(),
                product_id: drive.product_id.clone(),
                size_bytes: drive.size_bytes,
                health: drive.health,
                drive_type: drive.drive_type,
                status: drive.status,
                node_id: node_id.to_string(),
                path: drive.path.clone(),
            },
        }
    }
}

/// Whether a volume can currently be used by its consumers.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalStatus {
    Operative,
    Inoperative,
    Missing,
    Unknown,
}

impl fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationalStatus::Operative => "OPERATIVE",
            OperationalStatus::Inoperative => "INOPERATIVE",
            OperationalStatus::Missing => "MISSING",
            OperationalStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct VolumeSpec {
    pub id: String,
    pub node_id: String,
    /// The drive UUID or logical volume group backing the volume.
    pub location: String,
    pub size_bytes: u64,
    pub storage_class: String,
    pub operational_status: OperationalStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct VolumeRecord {
    pub name: String,
    pub spec: VolumeSpec,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct AvailableCapacitySpec {
    pub node_id: String,
    pub location: String,
    pub size_bytes: u64,
    pub storage_class: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct AvailableCapacityRecord {
    pub name: String,
    pub spec: AvailableCapacitySpec,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LvgStatus {
    Creating,
    Created,
    Failed,
    Removing,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct LogicalVolumeGroupSpec {
    /// Name of the volume group on the node. This differs from the record
    /// name for groups built on the system volume group.
    pub name: String,
    pub node: String,
    pub locations: Vec<String>,
    pub size_bytes: u64,
    pub status: LvgStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct LogicalVolumeGroupRecord {
    pub name: String,
    pub spec: LogicalVolumeGroupSpec,
}
