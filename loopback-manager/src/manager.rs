// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The drive manager for a node whose drives are loop devices.

use crate::device::{BulkOperationError, DeviceOps, NodeSettings, VirtualDevice};
use crate::fleet_config::{ConfigError, FleetConfig};
use crate::reconciler::{ReconcileError, ReconcileSummary, Reconciler};
use crate::recovery;
use crate::registry::DeviceRegistry;
use camino::Utf8Path;
use drive_types::{
    DriveDescriptor, DriveManager, DriveManagerError, DriveStatus,
};
use host_utils::host::BoxedExecutor;
use slog::{info, o, warn, Logger};
use std::sync::Mutex;

struct Inner {
    registry: DeviceRegistry,
    config: FleetConfig,
}

/// Keeps the loop devices of one node converged to a [FleetConfig].
///
/// The registry and the active configuration live behind one lock. Each
/// mutating pass holds it for its whole duration, so readers never see a
/// partially reconciled registry.
pub struct LoopbackManager {
    log: Logger,
    settings: NodeSettings,
    ops: DeviceOps,
    inner: Mutex<Inner>,
}

impl LoopbackManager {
    /// Recovers devices from the images directory, then reconciles them
    /// against `config`.
    ///
    /// A failed initial pass is logged; [Self::reconcile] may be retried.
    pub fn new(
        executor: BoxedExecutor,
        settings: NodeSettings,
        config: FleetConfig,
        log: &Logger,
    ) -> Self {
        let log = log.new(o!(
            "component" => "LoopbackManager",
            "node_id" => settings.node_id.clone(),
        ));
        let ops = DeviceOps::new(&executor, &log);

        let mut registry = DeviceRegistry::new();
        let recovered =
            recovery::recover(&log, &ops, &settings, &config, &mut registry);
        info!(log, "Recovered virtual devices"; "count" => recovered);

        let manager = Self {
            log,
            settings,
            ops,
            inner: Mutex::new(Inner { registry, config }),
        };
        if let Err(err) = manager.reconcile() {
            warn!(manager.log, "Initial reconciliation failed"; "error" => %err);
        }
        manager
    }

    pub fn node_id(&self) -> &str {
        &self.settings.node_id
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn config(&self) -> FleetConfig {
        self.inner.lock().unwrap().config.clone()
    }

    /// Replaces the active configuration. Call [Self::reconcile] to apply it.
    pub fn set_config(&self, config: FleetConfig) {
        self.inner.lock().unwrap().config = config;
    }

    /// Reads a new configuration from `path`.
    ///
    /// If the file cannot be read or parsed, the active configuration is
    /// kept and the error returned.
    pub fn load_config<P: AsRef<Utf8Path>>(
        &self,
        path: P,
    ) -> Result<(), ConfigError> {
        let config = FleetConfig::from_file(path)?;
        self.set_config(config);
        Ok(())
    }

    /// Converges the registry to the active configuration.
    pub fn reconcile(&self) -> Result<ReconcileSummary, ReconcileError> {
        let mut inner = self.inner.lock().unwrap();
        let Inner { registry, config } = &mut *inner;
        Reconciler::new(&self.log, &self.ops, &self.settings, config)
            .reconcile(registry)
    }

    /// Creates and attaches the backing file of every device which is not
    /// marked removed and has no loop device yet.
    ///
    /// Returns the number of devices which were attached.
    pub fn ensure_attached(&self) -> Result<usize, BulkOperationError> {
        let mut inner = self.inner.lock().unwrap();
        let mut attached = 0;
        let mut errors = BulkOperationError::new("attach");
        for device in inner.registry.iter_mut() {
            if device.attributes.removed || device.device_path.is_some() {
                continue;
            }
            match self.ops.materialize(device) {
                Ok(_) => attached += 1,
                Err(err) => {
                    warn!(
                        self.log,
                        "Failed to attach virtual device";
                        "serial" => &device.serial_number,
                        "error" => %err,
                    );
                    errors.push(&device.serial_number, err);
                }
            }
        }
        errors.into_result().map(|()| attached)
    }

    /// Detaches every device and deletes its backing file.
    ///
    /// Devices which were torn down leave the registry; the rest stay as
    /// they were and are named in the returned error.
    pub fn cleanup_loop_devices(&self) -> Result<(), BulkOperationError> {
        let mut inner = self.inner.lock().unwrap();
        let (done, result) = self.ops.teardown_all(inner.registry.iter_mut());
        inner.registry.retain(|device| !done.contains(&device.serial_number));
        info!(
            self.log,
            "Cleaned up virtual devices";
            "removed" => done.len(),
            "remaining" => inner.registry.len(),
        );
        result
    }

    pub fn device(&self, serial: &str) -> Option<VirtualDevice> {
        self.inner.lock().unwrap().registry.get(serial).cloned()
    }

    pub fn devices(&self) -> Vec<VirtualDevice> {
        self.inner.lock().unwrap().registry.iter().cloned().collect()
    }

    fn descriptor(&self, device: &VirtualDevice) -> DriveDescriptor {
        let attrs = &device.attributes;
        DriveDescriptor {
            serial_number: device.serial_number.clone(),
            vendor_id: attrs.vendor_id.clone(),
            product_id: attrs.product_id.clone(),
            size_bytes: attrs.size.to_bytes(),
            health: attrs.health,
            drive_type: attrs.drive_type,
            status: if attrs.removed {
                DriveStatus::Offline
            } else {
                DriveStatus::Online
            },
            node_id: self.settings.node_id.clone(),
            path: device
                .device_path
                .as_ref()
                .map(|path| path.to_string())
                .unwrap_or_default(),
        }
    }
}

impl DriveManager for LoopbackManager {
    fn drives(&self) -> Result<Vec<DriveDescriptor>, DriveManagerError> {
        let inner = self.inner.lock().map_err(|_| {
            DriveManagerError::Unavailable(
                "device registry lock is poisoned".to_string(),
            )
        })?;
        let drives =
            inner.registry.iter().map(|device| self.descriptor(device));
        Ok(drives.collect())
    }
}
