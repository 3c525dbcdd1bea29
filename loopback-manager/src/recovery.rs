// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rebuilding the registry from the images left behind by a previous run.

use crate::device::{
    serial_key, DeviceAttributes, DeviceOps, NodeSettings, VirtualDevice,
};
use crate::fleet_config::FleetConfig;
use crate::registry::DeviceRegistry;
use camino::Utf8PathBuf;
use drive_types::DriveSize;
use slog::{info, warn, Logger};

/// Adds a device to `registry` for each backing file in the images
/// directory, and deletes any other files found there.
///
/// Recovered devices take the size of their file and the other attributes
/// of any drive override in `config` for this node. Nothing is attached.
/// Problems with individual files are logged and skipped.
///
/// Returns the number of devices recovered.
pub fn recover(
    log: &Logger,
    ops: &DeviceOps,
    settings: &NodeSettings,
    config: &FleetConfig,
    registry: &mut DeviceRegistry,
) -> usize {
    if !registry.is_empty() {
        warn!(
            log,
            "Skipping recovery of a registry which is already populated";
            "devices" => registry.len(),
        );
        return 0;
    }

    let dir = &settings.images_dir;
    let entries = match dir.read_dir_utf8() {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(log, "No images to recover"; "dir" => %dir);
            return 0;
        }
        Err(err) => {
            warn!(
                log,
                "Failed to read images directory";
                "dir" => %dir,
                "error" => %err,
            );
            return 0;
        }
    };

    let mut files: Vec<(String, Utf8PathBuf, u64)> = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(log, "Skipping unreadable entry"; "dir" => %dir, "error" => %err);
                continue;
            }
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(
                    log,
                    "Skipping entry without metadata";
                    "path" => %entry.path(),
                    "error" => %err,
                );
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        files.push((
            entry.file_name().to_string(),
            entry.path().to_owned(),
            metadata.len(),
        ));
    }
    files.sort();

    let overrides = config.drives_for(&settings.node_id);
    let mut recovered = 0;
    for (name, path, len) in files {
        let Some(serial) = settings.serial_from_file_name(&name) else {
            info!(log, "Deleting unrecognized image file"; "path" => %path);
            if let Err(err) = ops.delete_file(&path) {
                warn!(
                    log,
                    "Failed to delete unrecognized image file";
                    "path" => %path,
                    "error" => %err,
                );
            }
            continue;
        };

        let mut attributes = DeviceAttributes::defaults(config);
        if len > 0 {
            attributes.size = DriveSize::from_bytes(len);
        }
        let key = serial_key(serial);
        let drive = overrides
            .iter()
            .find(|drive| serial_key(&drive.serial_number) == key);
        if let Some(drive) = drive {
            attributes = attributes.with_override_except_size(drive);
        }

        let device = VirtualDevice::new(serial.to_string(), attributes, path);
        match registry.push(device) {
            Ok(()) => {
                info!(log, "Recovered virtual device"; "serial" => serial);
                recovered += 1;
            }
            Err(err) => {
                warn!(
                    log,
                    "Skipping conflicting image file";
                    "file" => &name,
                    "error" => %err,
                );
            }
        }
    }
    recovered
}
