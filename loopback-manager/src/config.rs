// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for working with loopback agent configuration

use crate::device::NodeSettings;
use camino::{Utf8Path, Utf8PathBuf};
use dropshot::ConfigLogging;
use drive_types::DriveManagerKind;
use serde::Deserialize;
use std::time::Duration;

const HOSTNAME_FILE: &str = "/etc/hostname";

fn default_reload_period_secs() -> u64 {
    30
}

fn default_drive_manager() -> DriveManagerKind {
    DriveManagerKind::Loopback
}

/// Configuration for a loopback agent
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Configuration for the agent log
    pub log: ConfigLogging,
    /// Identity of this node in the fleet document.
    pub node_id: String,
    /// Prefix of the backing file names. Taken from the host if unset.
    pub hostname: Option<String>,
    /// Directory holding the backing files.
    pub images_dir: Utf8PathBuf,
    /// Path of the fleet document.
    pub fleet_config: Utf8PathBuf,
    #[serde(default = "default_reload_period_secs")]
    pub reload_period_secs: u64,
    #[serde(default = "default_drive_manager")]
    pub drive_manager: DriveManagerKind,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to parse config from {path}: {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
    #[error("Could not determine hostname: {0}")]
    Hostname(#[source] std::io::Error),
    #[error("Drive manager {0} is not supported by this agent")]
    UnsupportedDriveManager(DriveManagerKind),
}

impl Config {
    pub fn from_file<P: AsRef<Utf8Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io { path: path.into(), err })?;
        let config = toml::from_str(&contents)
            .map_err(|err| ConfigError::Parse { path: path.into(), err })?;
        Ok(config)
    }

    pub fn reload_period(&self) -> Duration {
        Duration::from_secs(self.reload_period_secs.max(1))
    }

    /// The hostname used to name backing files.
    ///
    /// If unsupplied, we default to the `HOSTNAME` environment variable, then
    /// the contents of `/etc/hostname`.
    pub fn hostname(&self) -> Result<String, ConfigError> {
        if let Some(hostname) = &self.hostname {
            return Ok(hostname.clone());
        }
        if let Ok(hostname) = std::env::var("HOSTNAME") {
            if !hostname.trim().is_empty() {
                return Ok(hostname.trim().to_string());
            }
        }
        let hostname = std::fs::read_to_string(HOSTNAME_FILE)
            .map_err(ConfigError::Hostname)?;
        Ok(hostname.trim().to_string())
    }

    pub fn node_settings(&self) -> Result<NodeSettings, ConfigError> {
        if self.drive_manager != DriveManagerKind::Loopback {
            return Err(ConfigError::UnsupportedDriveManager(
                self.drive_manager,
            ));
        }
        Ok(NodeSettings {
            node_id: self.node_id.clone(),
            hostname: self.hostname()?,
            images_dir: self.images_dir.clone(),
        })
    }
}
