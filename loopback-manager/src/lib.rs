// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A [drive_types::DriveManager] backed by loop devices.
//!
//! Each virtual drive is a regular file in an images directory, attached to
//! a loop device with `losetup`. A [FleetConfig] document describes how many
//! drives each node should have and what they look like; the
//! [LoopbackManager] converges the node's drives to it, and recovers them
//! from the images directory after a restart.

pub mod config;
pub mod device;
pub mod fleet_config;
mod manager;
pub mod reconciler;
pub mod recovery;
pub mod registry;

pub use device::{BulkOperationError, NodeSettings, VirtualDevice};
pub use fleet_config::{ConfigError, FleetConfig};
pub use manager::LoopbackManager;
pub use reconciler::{ReconcileError, ReconcileSummary};
