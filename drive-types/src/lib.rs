// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types shared between the drive managers on a node and the consumers which
//! publish their inventory.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

mod size;

pub use size::DriveSize;
pub use size::ParseSizeError;

/// Health of a drive, as reported by its manager.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriveHealth {
    #[default]
    Good,
    Suspect,
    Bad,
    Unknown,
}

impl fmt::Display for DriveHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriveHealth::Good => "GOOD",
            DriveHealth::Suspect => "SUSPECT",
            DriveHealth::Bad => "BAD",
            DriveHealth::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriveType {
    #[default]
    Hdd,
    Ssd,
    Nvme,
}

impl fmt::Display for DriveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriveType::Hdd => "HDD",
            DriveType::Ssd => "SSD",
            DriveType::Nvme => "NVME",
        };
        write!(f, "{s}")
    }
}

/// Whether a drive can currently be used.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriveStatus {
    Online,
    Offline,
}

impl fmt::Display for DriveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriveStatus::Online => "ONLINE",
            DriveStatus::Offline => "OFFLINE",
        };
        write!(f, "{s}")
    }
}

/// One drive as seen by a [DriveManager].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct DriveDescriptor {
    pub serial_number: String,
    pub vendor_id: String,
    pub product_id: String,
    pub size_bytes: u64,
    pub health: DriveHealth,
    pub drive_type: DriveType,
    pub status: DriveStatus,
    pub node_id: String,
    /// Path of the block device, or empty if the drive has none yet.
    pub path: String,
}

#[derive(thiserror::Error, Debug)]
pub enum DriveManagerError {
    #[error("Drive inventory is unavailable: {0}")]
    Unavailable(String),
}

/// The capability of listing the drives present on a node.
pub trait DriveManager: Send + Sync {
    fn drives(&self) -> Result<Vec<DriveDescriptor>, DriveManagerError>;
}

/// The implementations of [DriveManager] a node may be configured with.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum DriveManagerKind {
    #[serde(rename = "HAL")]
    Hal,
    #[serde(rename = "IDRAC")]
    Redfish,
    #[serde(rename = "LOOPBACK")]
    Loopback,
}

impl DriveManagerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveManagerKind::Hal => "HAL",
            DriveManagerKind::Redfish => "IDRAC",
            DriveManagerKind::Loopback => "LOOPBACK",
        }
    }
}

impl fmt::Display for DriveManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
