// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Converging the registry to the fleet configuration.
//!
//! A pass works in three steps, in registry order:
//!
//! 1. Devices named by a drive override of this node but not yet tracked are
//!    added.
//! 2. The number of devices is brought to the node's drive count, or to the
//!    number of overridden devices if that is larger. Growing adds devices
//!    with generated serials; shrinking tears down devices without an
//!    override, starting from the most recently added.
//! 3. Every device is brought to the attributes its override (or the
//!    defaults) describe. Only a change of size runs any command: the old
//!    loop device and backing file are torn down, and the device is left to
//!    be materialized again by [crate::LoopbackManager::ensure_attached].
//!
//! A pass over a registry which already matches runs no commands.

use crate::device::{
    serial_key, BulkOperationError, DeviceAttributes, DeviceOps, NodeSettings,
    VirtualDevice,
};
use crate::fleet_config::{DriveOverride, FleetConfig};
use crate::registry::DeviceRegistry;
use slog::{debug, info, o, warn, Logger};
use std::fmt;

/// Counts of the changes a pass made.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub removed: usize,
    /// Devices whose attributes changed in place.
    pub updated: usize,
    /// Devices torn down for a size change.
    pub recreated: usize,
}

impl ReconcileSummary {
    pub fn is_unchanged(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} updated, {} recreated",
            self.added, self.removed, self.updated, self.recreated
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Reconciliation incomplete ({summary}): {failures}")]
pub struct ReconcileError {
    /// The changes which were made despite the failures.
    pub summary: ReconcileSummary,
    #[source]
    pub failures: BulkOperationError,
}

pub struct Reconciler<'a> {
    log: Logger,
    ops: &'a DeviceOps,
    settings: &'a NodeSettings,
    config: &'a FleetConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        log: &Logger,
        ops: &'a DeviceOps,
        settings: &'a NodeSettings,
        config: &'a FleetConfig,
    ) -> Self {
        Self {
            log: log.new(o!("component" => "Reconciler")),
            ops,
            settings,
            config,
        }
    }

    /// Runs one pass for the node this reconciler was created for.
    pub fn reconcile(
        &self,
        registry: &mut DeviceRegistry,
    ) -> Result<ReconcileSummary, ReconcileError> {
        let node_id = &self.settings.node_id;
        let total = self.config.drive_count_for(node_id);
        let overrides = self.config.drives_for(node_id);
        debug!(
            self.log,
            "Reconciling virtual devices";
            "node_id" => node_id,
            "total" => total,
            "overrides" => overrides.len(),
            "tracked" => registry.len(),
        );
        let result =
            self.override_devices_from_node_config(registry, total, overrides);
        match &result {
            Ok(summary) if summary.is_unchanged() => {}
            Ok(summary) => {
                info!(self.log, "Reconciled virtual devices"; "changes" => %summary)
            }
            Err(err) => {
                warn!(self.log, "Reconciliation incomplete"; "error" => %err)
            }
        }
        result
    }

    /// Converges `registry` to `total` devices and the given overrides.
    pub fn override_devices_from_node_config(
        &self,
        registry: &mut DeviceRegistry,
        total: usize,
        overrides: &[DriveOverride],
    ) -> Result<ReconcileSummary, ReconcileError> {
        let mut summary = ReconcileSummary::default();
        let mut failures = BulkOperationError::new("reconcile");

        self.add_overridden_devices(registry, overrides, &mut summary);
        self.converge_count(
            registry,
            total,
            overrides,
            &mut summary,
            &mut failures,
        );
        self.converge_attributes(
            registry,
            overrides,
            &mut summary,
            &mut failures,
        );

        match failures.into_result() {
            Ok(()) => Ok(summary),
            Err(failures) => Err(ReconcileError { summary, failures }),
        }
    }

    fn add_overridden_devices(
        &self,
        registry: &mut DeviceRegistry,
        overrides: &[DriveOverride],
        summary: &mut ReconcileSummary,
    ) {
        for drive in overrides {
            let serial = &drive.serial_number;
            if serial.is_empty() {
                warn!(self.log, "Ignoring drive override without a serial number");
                continue;
            }
            if registry.contains(serial) {
                continue;
            }
            let device = VirtualDevice::new(
                serial.clone(),
                DeviceAttributes::desired(self.config, Some(drive)),
                self.settings.backing_file_for(serial),
            );
            match registry.push(device) {
                Ok(()) => {
                    info!(self.log, "Added overridden device"; "serial" => serial);
                    summary.added += 1;
                }
                Err(err) => {
                    warn!(self.log, "Ignoring drive override"; "error" => %err)
                }
            }
        }
    }

    fn converge_count(
        &self,
        registry: &mut DeviceRegistry,
        total: usize,
        overrides: &[DriveOverride],
        summary: &mut ReconcileSummary,
        failures: &mut BulkOperationError,
    ) {
        let overridden = registry
            .iter()
            .filter(|device| find_override(overrides, device).is_some())
            .count();
        let target = total.max(overridden);

        while registry.len() < target {
            let serial =
                registry.next_free_serial(&self.settings.hostname, |serial| {
                    is_overridden(overrides, serial)
                });
            let device = VirtualDevice::new(
                serial.clone(),
                DeviceAttributes::defaults(self.config),
                self.settings.backing_file_for(&serial),
            );
            if let Err(err) = registry.push(device) {
                warn!(self.log, "Failed to add device"; "error" => %err);
                break;
            }
            info!(self.log, "Added device"; "serial" => &serial);
            summary.added += 1;
        }

        let mut index = registry.len();
        while registry.len() > target && index > 0 {
            index -= 1;
            let Some(device) = registry.get_index_mut(index) else {
                break;
            };
            if find_override(overrides, device).is_some() {
                continue;
            }
            match self.ops.teardown(device) {
                Ok(()) => {
                    let device = registry.remove(index);
                    info!(
                        self.log,
                        "Removed device";
                        "serial" => device.serial_number,
                    );
                    summary.removed += 1;
                }
                Err(err) => {
                    warn!(
                        self.log,
                        "Failed to remove device";
                        "serial" => &device.serial_number,
                        "error" => %err,
                    );
                    failures.push(&device.serial_number, err);
                }
            }
        }
    }

    fn converge_attributes(
        &self,
        registry: &mut DeviceRegistry,
        overrides: &[DriveOverride],
        summary: &mut ReconcileSummary,
        failures: &mut BulkOperationError,
    ) {
        for device in registry.iter_mut() {
            let desired = DeviceAttributes::desired(
                self.config,
                find_override(overrides, device),
            );
            if device.attributes == desired {
                continue;
            }

            if device.attributes.size == desired.size {
                debug!(
                    self.log,
                    "Updating device attributes";
                    "serial" => &device.serial_number,
                );
                device.attributes = desired;
                summary.updated += 1;
                continue;
            }

            // Loop devices cannot be resized in place.
            match self.ops.teardown(device) {
                Ok(()) => {
                    info!(
                        self.log,
                        "Resized device";
                        "serial" => &device.serial_number,
                        "from" => %device.attributes.size,
                        "to" => %desired.size,
                    );
                    device.attributes = desired;
                    summary.recreated += 1;
                }
                Err(err) => {
                    warn!(
                        self.log,
                        "Failed to resize device";
                        "serial" => &device.serial_number,
                        "error" => %err,
                    );
                    failures.push(&device.serial_number, err);
                }
            }
        }
    }
}

fn is_overridden(overrides: &[DriveOverride], serial: &str) -> bool {
    let key = serial_key(serial);
    overrides.iter().any(|drive| serial_key(&drive.serial_number) == key)
}

fn find_override<'o>(
    overrides: &'o [DriveOverride],
    device: &VirtualDevice,
) -> Option<&'o DriveOverride> {
    overrides
        .iter()
        .find(|drive| serial_key(&drive.serial_number) == device.key())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fleet_config::NodeOverride;
    use assert_matches::assert_matches;
    use drive_types::DriveSize;
    use host_utils::host::{
        FakeExecutor, Input, Output, OutputExt, StaticHandler,
    };
    use loopback_test_utils::dev::test_setup_log;
    use std::sync::Arc;
    use test_strategy::proptest;

    const NODE: &str = "testNode";

    fn settings() -> NodeSettings {
        NodeSettings {
            node_id: NODE.to_string(),
            hostname: "host".to_string(),
            images_dir: "/images".into(),
        }
    }

    /// A registry of `count` default devices attached to `/dev/loop<i>`.
    fn attached_registry(config: &FleetConfig, count: usize) -> DeviceRegistry {
        let settings = settings();
        let mut registry = DeviceRegistry::new();
        for i in 0..count {
            let serial = format!("SN{i}");
            let mut device = VirtualDevice::new(
                serial.clone(),
                DeviceAttributes::defaults(config),
                settings.backing_file_for(&serial),
            );
            device.device_path = Some(format!("/dev/loop{i}").into());
            registry.push(device).unwrap();
        }
        registry
    }

    fn node_config(
        default_size: Option<DriveSize>,
        drive_count: Option<usize>,
        drives: Vec<DriveOverride>,
    ) -> FleetConfig {
        FleetConfig {
            default_drive_count: Some(3),
            default_drive_size: default_size,
            nodes: vec![NodeOverride {
                node_id: NODE.to_string(),
                drive_count,
                drives,
            }],
        }
    }

    fn fake_ops(executor: &Arc<FakeExecutor>, log: &Logger) -> DeviceOps {
        DeviceOps::new(&executor.clone().as_executor(), log)
    }

    #[test]
    fn empty_registry_gets_default_devices() {
        let logctx = test_setup_log("empty_registry_gets_default_devices");
        let executor = FakeExecutor::new(logctx.log.clone());
        StaticHandler::new().register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();
        let config = FleetConfig::default();

        let mut registry = DeviceRegistry::new();
        let summary = Reconciler::new(&logctx.log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap();

        assert_eq!(summary.added, 3);
        assert_eq!(registry.len(), 3);
        let defaults = DeviceAttributes::defaults(&config);
        for device in registry.iter() {
            assert_eq!(device.attributes, defaults);
            assert_eq!(
                device.backing_file,
                settings.backing_file_for(&device.serial_number)
            );
            assert_eq!(device.device_path, None);
        }

        logctx.cleanup_successful();
    }

    #[test]
    fn node_override_sets_count_and_serial() {
        let logctx = test_setup_log("node_override_sets_count_and_serial");
        let executor = FakeExecutor::new(logctx.log.clone());
        StaticHandler::new().register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();

        let config = FleetConfig {
            default_drive_count: Some(3),
            ..Default::default()
        };
        let mut registry = DeviceRegistry::new();
        Reconciler::new(&logctx.log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap();
        assert_eq!(registry.len(), 3);

        let config =
            node_config(None, Some(5), vec![DriveOverride::new("testSN")]);
        let summary = Reconciler::new(&logctx.log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(registry.len(), 5);
        assert!(registry.contains("testSN"));

        logctx.cleanup_successful();
    }

    #[test]
    fn other_nodes_are_ignored() {
        let logctx = test_setup_log("other_nodes_are_ignored");
        let executor = FakeExecutor::new(logctx.log.clone());
        StaticHandler::new().register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = NodeSettings { node_id: "elsewhere".into(), ..settings() };

        let config =
            node_config(None, Some(5), vec![DriveOverride::new("testSN")]);
        let mut registry = DeviceRegistry::new();
        Reconciler::new(&logctx.log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap();
        assert_eq!(registry.len(), 3);
        assert!(!registry.contains("testSN"));

        logctx.cleanup_successful();
    }

    #[test]
    fn default_size_change_recreates_every_device() {
        let logctx =
            test_setup_log("default_size_change_recreates_every_device");
        let executor = FakeExecutor::new(logctx.log.clone());
        let mut registry = attached_registry(&FleetConfig::default(), 3);
        let mut handler = StaticHandler::new();
        for i in 0..3 {
            handler.expect_ok(format!("losetup -d /dev/loop{i}"));
            handler.expect_ok(format!("rm -f /images/host-SN{i}.img"));
        }
        handler.register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();

        let config = FleetConfig {
            default_drive_count: Some(3),
            default_drive_size: Some("30Mi".parse().unwrap()),
            nodes: vec![],
        };
        let summary = Reconciler::new(&logctx.log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap();

        assert_eq!(summary.recreated, 3);
        for device in registry.iter() {
            assert_eq!(device.attributes.size.to_string(), "30Mi");
            assert_eq!(device.device_path, None);
        }

        logctx.cleanup_successful();
    }

    #[test]
    fn drive_size_override_and_revert() {
        let logctx = test_setup_log("drive_size_override_and_revert");
        let log = &logctx.log;
        let executor = FakeExecutor::new(log.clone());
        let ops = fake_ops(&executor, log);
        let settings = settings();
        let thirty = DriveSize::from_mib(30);
        let forty = DriveSize::from_mib(40);

        let base = FleetConfig {
            default_drive_size: Some(thirty),
            ..FleetConfig::default()
        };
        let mut registry = attached_registry(&base, 5);

        // First reload pins SN2 at 40Mi.
        let mut handler = StaticHandler::new();
        handler.expect_ok("losetup -d /dev/loop2");
        handler.expect_ok("rm -f /images/host-SN2.img");
        handler.register(&executor);
        let drive = DriveOverride { size: Some(forty), ..DriveOverride::new("SN2") };
        let config = node_config(Some(thirty), Some(5), vec![drive]);
        let summary = Reconciler::new(log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap();
        assert_eq!(
            summary,
            ReconcileSummary { recreated: 1, ..Default::default() }
        );
        for device in registry.iter() {
            let expected = if device.serial_number == "SN2" { forty } else { thirty };
            assert_eq!(device.attributes.size, expected);
        }

        // The device was materialized again in between.
        registry.get_mut("SN2").unwrap().device_path =
            Some("/dev/loop7".into());

        // Second reload drops the size from the override.
        let mut handler = StaticHandler::new();
        handler.expect_ok("losetup -d /dev/loop7");
        handler.expect_ok("rm -f /images/host-SN2.img");
        handler.register(&executor);
        let config =
            node_config(Some(thirty), Some(5), vec![DriveOverride::new("SN2")]);
        let summary = Reconciler::new(log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap();
        assert_eq!(summary.recreated, 1);
        assert_eq!(registry.get("SN2").unwrap().attributes.size, thirty);

        // Nothing left to do.
        StaticHandler::new().register(&executor);
        let summary = Reconciler::new(log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap();
        assert!(summary.is_unchanged());

        logctx.cleanup_successful();
    }

    #[test]
    fn attribute_override_without_teardown() {
        let logctx = test_setup_log("attribute_override_without_teardown");
        let executor = FakeExecutor::new(logctx.log.clone());
        StaticHandler::new().register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();
        let config = FleetConfig::default();
        let reconciler = Reconciler::new(&logctx.log, &ops, &settings, &config);

        let mut registry = DeviceRegistry::new();
        reconciler.reconcile(&mut registry).unwrap();
        let n = registry.len();
        let first = registry.iter().next().unwrap().serial_number.clone();

        let overrides = vec![
            DriveOverride {
                vendor_id: Some("newVID".to_string()),
                ..DriveOverride::new(first.clone())
            },
            DriveOverride::new("newDevice"),
        ];
        let summary = reconciler
            .override_devices_from_node_config(&mut registry, n + 1, &overrides)
            .unwrap();

        assert_eq!(
            summary,
            ReconcileSummary { added: 1, updated: 1, ..Default::default() }
        );
        assert_eq!(registry.len(), n + 1);
        assert_eq!(registry.iter().next().unwrap().serial_number, first);
        assert_eq!(registry.get(&first).unwrap().attributes.vendor_id, "newVID");
        assert!(registry.contains("newDevice"));

        logctx.cleanup_successful();
    }

    #[test]
    fn size_override_of_existing_device() {
        let logctx = test_setup_log("size_override_of_existing_device");
        let executor = FakeExecutor::new(logctx.log.clone());
        let config = FleetConfig::default();
        let mut registry = attached_registry(&config, 3);
        registry.get_mut("SN0").unwrap().backing_file = "loopback.img".into();
        let mut handler = StaticHandler::new();
        handler.expect_ok("losetup -d /dev/loop0");
        handler.expect_ok("rm -f loopback.img");
        handler.register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();

        let overrides = vec![DriveOverride {
            size: Some("200Mi".parse().unwrap()),
            ..DriveOverride::new("SN0")
        }];
        Reconciler::new(&logctx.log, &ops, &settings, &config)
            .override_devices_from_node_config(&mut registry, 3, &overrides)
            .unwrap();
        assert_eq!(
            registry.get("SN0").unwrap().attributes.size.to_string(),
            "200Mi"
        );

        logctx.cleanup_successful();
    }

    #[test]
    fn failed_resize_leaves_device_unchanged() {
        let logctx = test_setup_log("failed_resize_leaves_device_unchanged");
        let executor = FakeExecutor::new(logctx.log.clone());
        let config = FleetConfig::default();
        let mut registry = attached_registry(&config, 2);
        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell("losetup -d /dev/loop0"),
            Output::failure().with_stderr("device busy"),
        );
        handler.expect_ok("losetup -d /dev/loop1");
        handler.expect_ok("rm -f /images/host-SN1.img");
        handler.register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();

        let config = FleetConfig {
            default_drive_count: Some(2),
            default_drive_size: Some(DriveSize::from_mib(30)),
            nodes: vec![],
        };
        let before = registry.get("SN0").unwrap().clone();
        let err = Reconciler::new(&logctx.log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap_err();

        assert_eq!(err.failures.failed_serials(), vec!["SN0"]);
        assert_eq!(err.summary.recreated, 1);
        assert_eq!(registry.get("SN0").unwrap(), &before);
        assert_eq!(
            registry.get("SN1").unwrap().attributes.size,
            DriveSize::from_mib(30)
        );

        logctx.cleanup_successful();
    }

    #[test]
    fn shrink_removes_devices_without_override() {
        let logctx = test_setup_log("shrink_removes_devices_without_override");
        let executor = FakeExecutor::new(logctx.log.clone());
        let config = FleetConfig::default();
        let mut registry = attached_registry(&config, 4);
        let mut handler = StaticHandler::new();
        // SN3 is pinned by an override, so SN2 and SN1 go.
        handler.expect_ok("losetup -d /dev/loop2");
        handler.expect_ok("rm -f /images/host-SN2.img");
        handler.expect_fail("losetup -d /dev/loop1");
        handler.expect_ok("losetup -d /dev/loop0");
        handler.expect_ok("rm -f /images/host-SN0.img");
        handler.register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();

        let overrides = vec![DriveOverride::new("SN3")];
        let err = Reconciler::new(&logctx.log, &ops, &settings, &config)
            .override_devices_from_node_config(&mut registry, 1, &overrides)
            .unwrap_err();
        assert_eq!(err.failures.failed_serials(), vec!["SN1"]);
        assert_eq!(err.summary.removed, 2);
        let serials: Vec<_> =
            registry.iter().map(|d| d.serial_number.as_str()).collect();
        assert_eq!(serials, ["SN1", "SN3"]);

        logctx.cleanup_successful();
    }

    #[test]
    fn overrides_beyond_count_are_kept() {
        let logctx = test_setup_log("overrides_beyond_count_are_kept");
        let executor = FakeExecutor::new(logctx.log.clone());
        StaticHandler::new().register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();
        let config = node_config(
            None,
            Some(1),
            vec![DriveOverride::new("A"), DriveOverride::new("B")],
        );

        let mut registry = DeviceRegistry::new();
        Reconciler::new(&logctx.log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap();
        let serials: Vec<_> =
            registry.iter().map(|d| d.serial_number.as_str()).collect();
        assert_eq!(serials, ["A", "B"]);

        logctx.cleanup_successful();
    }

    #[test]
    fn second_pass_runs_no_commands() {
        let logctx = test_setup_log("second_pass_runs_no_commands");
        let executor = FakeExecutor::new(logctx.log.clone());
        let base = FleetConfig::default();
        let mut registry = attached_registry(&base, 2);
        let mut handler = StaticHandler::new();
        handler.expect_ok("losetup -d /dev/loop0");
        handler.expect_ok("rm -f /images/host-SN0.img");
        handler.register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();

        let config = node_config(
            None,
            Some(4),
            vec![
                DriveOverride {
                    size: Some(DriveSize::from_mib(10)),
                    ..DriveOverride::new("SN0")
                },
                DriveOverride {
                    vendor_id: Some("VID".to_string()),
                    ..DriveOverride::new("LOOPBACKSN1")
                },
            ],
        );
        let reconciler = Reconciler::new(&logctx.log, &ops, &settings, &config);
        let summary = reconciler.reconcile(&mut registry).unwrap();
        assert_eq!(
            summary,
            ReconcileSummary {
                added: 2,
                removed: 0,
                updated: 1,
                recreated: 1,
            }
        );
        let snapshot: Vec<_> = registry.iter().cloned().collect();

        StaticHandler::new().register(&executor);
        let summary = reconciler.reconcile(&mut registry).unwrap();
        assert!(summary.is_unchanged());
        assert_eq!(registry.iter().cloned().collect::<Vec<_>>(), snapshot);

        logctx.cleanup_successful();
    }

    #[proptest]
    fn converges_to_default_count(
        #[strategy(0usize..24)] initial: usize,
        #[strategy(0usize..24)] count: usize,
    ) {
        let logctx = test_setup_log("converges_to_default_count");
        let executor = FakeExecutor::new(logctx.log.clone());
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();

        let mut registry = attached_registry(&FleetConfig::default(), initial);
        let config = FleetConfig {
            default_drive_count: Some(count),
            nodes: vec![NodeOverride {
                node_id: "someone-else".to_string(),
                drive_count: Some(count + 1),
                drives: vec![DriveOverride::new("SN0")],
            }],
            ..Default::default()
        };
        let reconciler =
            Reconciler::new(&logctx.log, &ops, &settings, &config);
        reconciler.reconcile(&mut registry).unwrap();
        assert_eq!(registry.len(), count);

        let summary = reconciler.reconcile(&mut registry).unwrap();
        assert!(summary.is_unchanged());

        logctx.cleanup_successful();
    }

    #[test]
    fn reconcile_error_reports_summary() {
        let logctx = test_setup_log("reconcile_error_reports_summary");
        let executor = FakeExecutor::new(logctx.log.clone());
        let mut registry = attached_registry(&FleetConfig::default(), 2);
        let mut handler = StaticHandler::new();
        handler.expect_fail("losetup -d /dev/loop1");
        // The failure does not stop the shrink from moving on to SN0.
        handler.expect_ok("losetup -d /dev/loop0");
        handler.expect_ok("rm -f /images/host-SN0.img");
        handler.register(&executor);
        let ops = fake_ops(&executor, &logctx.log);
        let settings = settings();
        let config = FleetConfig {
            default_drive_count: Some(1),
            ..Default::default()
        };

        let err = Reconciler::new(&logctx.log, &ops, &settings, &config)
            .reconcile(&mut registry)
            .unwrap_err();
        assert_matches!(err.summary, ReconcileSummary { removed: 1, .. });
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("SN1"));
        assert!(err.to_string().contains("SN1"), "{err}");

        logctx.cleanup_successful();
    }
}
