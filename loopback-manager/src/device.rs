// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Virtual devices and the commands which materialize them on the host.

use crate::fleet_config::{DriveOverride, FleetConfig};
use camino::{Utf8Path, Utf8PathBuf};
use drive_types::{DriveHealth, DriveSize, DriveType};
use host_utils::host::BoxedExecutor;
use host_utils::image::{self, ImageFiles};
use host_utils::losetup::{self, Losetup};
use slog::{debug, info, o, warn, Logger};
use std::fmt;

pub const DEFAULT_VENDOR_ID: &str = "VIRTUAL";
pub const DEFAULT_PRODUCT_ID: &str = "LOOPBACK";

/// Generated serial numbers start with this prefix. Serials are compared with
/// it removed; see [serial_key].
pub const SERIAL_PREFIX: &str = "LOOPBACK";

/// Returns the part of `serial` which identifies a device.
///
/// `LOOPBACK56789` and `56789` name the same device.
pub fn serial_key(serial: &str) -> &str {
    serial.strip_prefix(SERIAL_PREFIX).unwrap_or(serial)
}

/// Where the loop devices of a node keep their backing files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSettings {
    pub node_id: String,
    pub hostname: String,
    pub images_dir: Utf8PathBuf,
}

impl NodeSettings {
    /// `<images_dir>/<hostname>-<serial>.img`
    pub fn backing_file_for(&self, serial: &str) -> Utf8PathBuf {
        self.images_dir.join(format!("{}-{serial}.img", self.hostname))
    }

    /// Extracts the serial number from the name of a backing file, if the
    /// name has the form produced by [Self::backing_file_for].
    pub fn serial_from_file_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let serial = name
            .strip_prefix(self.hostname.as_str())?
            .strip_prefix('-')?
            .strip_suffix(".img")?;
        if serial.is_empty() {
            None
        } else {
            Some(serial)
        }
    }
}

/// The configurable description of a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAttributes {
    pub vendor_id: String,
    pub product_id: String,
    pub size: DriveSize,
    pub health: DriveHealth,
    pub drive_type: DriveType,
    /// The device exists but should be reported offline.
    pub removed: bool,
}

impl DeviceAttributes {
    /// Attributes of a device with no override of its own.
    pub fn defaults(config: &FleetConfig) -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID.to_string(),
            product_id: DEFAULT_PRODUCT_ID.to_string(),
            size: config.drive_size(),
            health: DriveHealth::default(),
            drive_type: DriveType::default(),
            removed: false,
        }
    }

    /// Attributes a device should converge to.
    pub fn desired(
        config: &FleetConfig,
        drive: Option<&DriveOverride>,
    ) -> Self {
        let attrs = Self::defaults(config);
        match drive {
            Some(drive) => attrs.with_override(drive),
            None => attrs,
        }
    }

    pub fn with_override(self, drive: &DriveOverride) -> Self {
        Self {
            size: drive.size.unwrap_or(self.size),
            ..self.with_override_except_size(drive)
        }
    }

    /// Applies every attribute of `drive` other than its size.
    pub fn with_override_except_size(self, drive: &DriveOverride) -> Self {
        Self {
            vendor_id: drive.vendor_id.clone().unwrap_or(self.vendor_id),
            product_id: drive.product_id.clone().unwrap_or(self.product_id),
            size: self.size,
            health: drive.health.unwrap_or(self.health),
            drive_type: drive.drive_type.unwrap_or(self.drive_type),
            removed: drive.removed.unwrap_or(self.removed),
        }
    }
}

/// One loop-backed virtual drive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualDevice {
    pub serial_number: String,
    pub attributes: DeviceAttributes,
    pub backing_file: Utf8PathBuf,
    /// The loop device the backing file is attached to, once known.
    pub device_path: Option<Utf8PathBuf>,
}

impl VirtualDevice {
    pub fn new(
        serial_number: String,
        attributes: DeviceAttributes,
        backing_file: Utf8PathBuf,
    ) -> Self {
        Self { serial_number, attributes, backing_file, device_path: None }
    }

    pub fn key(&self) -> &str {
        serial_key(&self.serial_number)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error(transparent)]
    Losetup(#[from] losetup::Error),

    #[error(transparent)]
    Image(#[from] image::Error),
}

/// A single device which an operation failed on.
#[derive(Debug)]
pub struct DeviceFailure {
    pub serial_number: String,
    pub err: DeviceError,
}

/// An operation over many devices which failed on some of them.
///
/// Every device is attempted; the failures are collected here.
#[derive(Debug)]
pub struct BulkOperationError {
    pub operation: &'static str,
    pub failures: Vec<DeviceFailure>,
}

impl BulkOperationError {
    pub fn new(operation: &'static str) -> Self {
        Self { operation, failures: Vec::new() }
    }

    pub fn push(&mut self, serial_number: &str, err: DeviceError) {
        let serial_number = serial_number.to_string();
        self.failures.push(DeviceFailure { serial_number, err });
    }

    pub fn failed_serials(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.serial_number.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok(())` if nothing failed.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for BulkOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed for {} device(s)",
            self.operation,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.serial_number, failure.err)?;
        }
        Ok(())
    }
}

impl std::error::Error for BulkOperationError {}

/// Runs the host commands behind each device.
#[derive(Clone)]
pub struct DeviceOps {
    log: Logger,
    losetup: Losetup,
    images: ImageFiles,
}

impl DeviceOps {
    pub fn new(executor: &BoxedExecutor, log: &Logger) -> Self {
        Self {
            log: log.new(o!("component" => "DeviceOps")),
            losetup: Losetup::new(executor.clone()),
            images: ImageFiles::new(executor.clone()),
        }
    }

    /// Attaches the backing file of `device` and records the loop device.
    pub fn attach(
        &self,
        device: &mut VirtualDevice,
    ) -> Result<Utf8PathBuf, DeviceError> {
        let path = self.losetup.attach(&device.backing_file)?;
        info!(
            self.log,
            "Attached virtual device";
            "serial" => &device.serial_number,
            "device" => %path,
        );
        device.device_path = Some(path.clone());
        Ok(path)
    }

    /// Detaches `device` from its loop device, if it has one.
    pub fn detach(
        &self,
        device: &mut VirtualDevice,
    ) -> Result<(), DeviceError> {
        if let Some(path) = &device.device_path {
            self.losetup.detach(path)?;
            info!(
                self.log,
                "Detached virtual device";
                "serial" => &device.serial_number,
                "device" => %path,
            );
        }
        device.device_path = None;
        Ok(())
    }

    pub fn create_backing_file(
        &self,
        device: &VirtualDevice,
    ) -> Result<(), DeviceError> {
        self.images
            .create(&device.backing_file, device.attributes.size.to_bytes())?;
        Ok(())
    }

    pub fn delete_backing_file(
        &self,
        device: &VirtualDevice,
    ) -> Result<(), DeviceError> {
        self.delete_file(&device.backing_file)
    }

    /// Deletes an arbitrary file in the images directory.
    pub fn delete_file(&self, path: &Utf8Path) -> Result<(), DeviceError> {
        self.images.delete(path)?;
        Ok(())
    }

    /// Returns the loop device `file` is attached to, or `None` if it is not
    /// attached.
    pub fn find_attached_device_for(
        &self,
        file: &Utf8Path,
    ) -> Result<Option<Utf8PathBuf>, DeviceError> {
        Ok(self.losetup.find_device_for(file)?)
    }

    /// Detaches `device` and deletes its backing file.
    ///
    /// If the loop device is not known it is looked up first. On success the
    /// device is left unattached with no backing file.
    pub fn teardown(
        &self,
        device: &mut VirtualDevice,
    ) -> Result<(), DeviceError> {
        if device.device_path.is_none() {
            device.device_path =
                self.find_attached_device_for(&device.backing_file)?;
        }
        self.detach(device)?;
        self.delete_backing_file(device)?;
        debug!(
            self.log,
            "Tore down virtual device";
            "serial" => &device.serial_number,
            "file" => %device.backing_file,
        );
        Ok(())
    }

    /// Tears down every device in `devices`, continuing past failures.
    ///
    /// Returns the serial numbers of the devices which were torn down.
    pub fn teardown_all<'a, I>(
        &self,
        devices: I,
    ) -> (Vec<String>, Result<(), BulkOperationError>)
    where
        I: IntoIterator<Item = &'a mut VirtualDevice>,
    {
        let mut done = Vec::new();
        let mut errors = BulkOperationError::new("teardown");
        for device in devices {
            match self.teardown(device) {
                Ok(()) => done.push(device.serial_number.clone()),
                Err(err) => {
                    warn!(
                        self.log,
                        "Failed to tear down virtual device";
                        "serial" => &device.serial_number,
                        "error" => %err,
                    );
                    errors.push(&device.serial_number, err);
                }
            }
        }
        (done, errors.into_result())
    }

    /// Makes sure `device` has a backing file attached to a loop device.
    ///
    /// An existing attachment of the backing file is adopted. Otherwise the
    /// file is created if it is missing, then attached.
    pub fn materialize(
        &self,
        device: &mut VirtualDevice,
    ) -> Result<Utf8PathBuf, DeviceError> {
        if let Some(path) = &device.device_path {
            return Ok(path.clone());
        }
        if let Some(path) = self.find_attached_device_for(&device.backing_file)?
        {
            debug!(
                self.log,
                "Adopting existing attachment";
                "serial" => &device.serial_number,
                "device" => %path,
            );
            device.device_path = Some(path.clone());
            return Ok(path);
        }
        if !device.backing_file.is_file() {
            self.create_backing_file(device)?;
        }
        self.attach(device)
    }
}
