// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fleet document describing which virtual drives each node should have.

use camino::{Utf8Path, Utf8PathBuf};
use drive_types::{DriveHealth, DriveSize, DriveType};
use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};

/// Number of drives a node gets when neither the node nor the document says
/// otherwise.
pub const DEFAULT_DRIVE_COUNT: usize = 3;

/// Size of a drive when neither its override nor the document says
/// otherwise.
pub const DEFAULT_DRIVE_SIZE: DriveSize = DriveSize::from_mib(100);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read fleet config from {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to parse fleet config from {path}: {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: serde_yaml::Error,
    },
}

/// Desired state for the virtual drives of every node.
///
/// Each field is optional; the effective value for a drive is resolved in
/// the order drive override, node override, document default, built-in
/// default.
///
/// Older documents spell the default count `defaultDrivePerNodeCount`. A
/// document may carry both keys, in which case `defaultDriveCount` wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", from = "RawFleetConfig")]
pub struct FleetConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_drive_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_drive_size: Option<DriveSize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeOverride>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFleetConfig {
    #[serde(default)]
    default_drive_count: Option<usize>,
    #[serde(default)]
    default_drive_per_node_count: Option<usize>,
    #[serde(default, deserialize_with = "empty_size_as_none")]
    default_drive_size: Option<DriveSize>,
    #[serde(default)]
    nodes: Vec<NodeOverride>,
}

impl From<RawFleetConfig> for FleetConfig {
    fn from(raw: RawFleetConfig) -> Self {
        Self {
            default_drive_count: raw
                .default_drive_count
                .or(raw.default_drive_per_node_count),
            default_drive_size: raw.default_drive_size,
            nodes: raw.nodes,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOverride {
    #[serde(rename = "nodeID", default)]
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drives: Vec<DriveOverride>,
}

/// Attributes pinned for one drive of a node, identified by serial number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveOverride {
    pub serial_number: String,
    #[serde(
        default,
        deserialize_with = "empty_size_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<DriveSize>,
    #[serde(
        rename = "vendorID",
        alias = "vid",
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub vendor_id: Option<String>,
    #[serde(
        rename = "productID",
        alias = "pid",
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<DriveHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_type: Option<DriveType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
}

impl DriveOverride {
    pub fn new<S: Into<String>>(serial_number: S) -> Self {
        Self { serial_number: serial_number.into(), ..Default::default() }
    }
}

fn empty_size_as_none<'de, D>(
    deserializer: D,
) -> Result<Option<DriveSize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSize {
        Size(DriveSize),
        Text(String),
    }

    match Option::<RawSize>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawSize::Size(size)) => Ok(Some(size)),
        Some(RawSize::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawSize::Text(text)) => {
            text.parse().map(Some).map_err(D::Error::custom)
        }
    }
}

fn empty_string_as_none<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

impl FleetConfig {
    /// Reads a fleet document.
    ///
    /// A document which is empty, or contains only whitespace and comments,
    /// describes an empty configuration.
    pub fn from_file<P: AsRef<Utf8Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io { path: path.into(), err })?;
        Self::from_yaml(&contents)
            .map_err(|err| ConfigError::Parse { path: path.into(), err })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value)
    }

    /// Returns the override for `node_id`.
    ///
    /// Only the first entry naming the node counts.
    pub fn node(&self, node_id: &str) -> Option<&NodeOverride> {
        self.nodes.iter().find(|node| node.node_id == node_id)
    }

    pub fn drive_count(&self) -> usize {
        self.default_drive_count.unwrap_or(DEFAULT_DRIVE_COUNT)
    }

    pub fn drive_size(&self) -> DriveSize {
        self.default_drive_size.unwrap_or(DEFAULT_DRIVE_SIZE)
    }

    /// The number of drives `node_id` should have.
    pub fn drive_count_for(&self, node_id: &str) -> usize {
        self.node(node_id)
            .and_then(|node| node.drive_count)
            .unwrap_or_else(|| self.drive_count())
    }

    /// The drive overrides which apply to `node_id`.
    pub fn drives_for(&self, node_id: &str) -> &[DriveOverride] {
        self.node(node_id).map(|node| node.drives.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::NamedUtf8TempFile;
    use std::io::Write;

    #[test]
    fn parse_full_document() {
        let config = FleetConfig::from_yaml(
            r#"
defaultDriveCount: 4
defaultDriveSize: 30Mi
nodes:
- nodeID: node-1
  driveCount: 5
  drives:
  - serialNumber: testSN
    size: 40Mi
    vendorID: newVID
    pid: PRODUCT
    health: BAD
    driveType: SSD
    removed: true
- nodeID: node-2
"#,
        )
        .unwrap();

        assert_eq!(config.default_drive_count, Some(4));
        assert_eq!(config.default_drive_size, Some(DriveSize::from_mib(30)));
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.drive_count_for("node-1"), 5);
        assert_eq!(config.drive_count_for("node-2"), 4);
        assert_eq!(config.drive_count_for("node-3"), 4);

        let drive = &config.drives_for("node-1")[0];
        assert_eq!(drive.serial_number, "testSN");
        assert_eq!(drive.size, Some(DriveSize::from_mib(40)));
        assert_eq!(drive.vendor_id.as_deref(), Some("newVID"));
        assert_eq!(drive.product_id.as_deref(), Some("PRODUCT"));
        assert_eq!(drive.health, Some(DriveHealth::Bad));
        assert_eq!(drive.drive_type, Some(DriveType::Ssd));
        assert_eq!(drive.removed, Some(true));
        assert!(config.drives_for("node-2").is_empty());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config = FleetConfig::from_yaml("defaultDrivePerNodeCount: 3\n")
            .unwrap();
        assert_eq!(config.default_drive_count, Some(3));
        assert_eq!(config.drive_size(), DEFAULT_DRIVE_SIZE);
        assert!(config.nodes.is_empty());

        let config = FleetConfig::from_yaml("").unwrap();
        assert_eq!(config, FleetConfig::default());
        assert_eq!(config.drive_count(), DEFAULT_DRIVE_COUNT);

        let config = FleetConfig::from_yaml("  \n# nothing here\n").unwrap();
        assert_eq!(config, FleetConfig::default());
    }

    #[test]
    fn both_default_count_keys() {
        let config = FleetConfig::from_yaml(
            "defaultDriveCount: 2\ndefaultDrivePerNodeCount: 3\n",
        )
        .unwrap();
        assert_eq!(config.drive_count(), 2);

        let config = FleetConfig::from_yaml(
            "defaultDrivePerNodeCount: 3\ndefaultDriveCount: 2\n",
        )
        .unwrap();
        assert_eq!(config.drive_count(), 2);
    }

    #[test]
    fn serialized_config_reads_back() {
        let config = FleetConfig {
            default_drive_count: Some(4),
            default_drive_size: Some(DriveSize::from_mib(30)),
            nodes: vec![NodeOverride {
                node_id: "node-1".to_string(),
                drive_count: Some(1),
                drives: vec![DriveOverride::new("SN1")],
            }],
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("defaultDriveCount: 4"), "{yaml}");
        assert_eq!(FleetConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn empty_values_are_unset() {
        let config = FleetConfig::from_yaml(
            r#"
defaultDriveSize: ""
nodes:
- nodeID: node-1
  drives:
  - serialNumber: SN1
    size: ""
    vendorID: ""
"#,
        )
        .unwrap();
        assert_eq!(config.default_drive_size, None);
        let drive = &config.drives_for("node-1")[0];
        assert_eq!(drive.size, None);
        assert_eq!(drive.vendor_id, None);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config = FleetConfig::from_yaml(
            "defaultDriveCount: 2\nflavor: vanilla\nnodes:\n- nodeID: n\n  color: red\n",
        )
        .unwrap();
        assert_eq!(config.default_drive_count, Some(2));
        assert_eq!(config.nodes[0].node_id, "n");
    }

    #[test]
    fn first_matching_node_wins() {
        let config = FleetConfig::from_yaml(
            "nodes:\n- nodeID: n\n  driveCount: 1\n- nodeID: n\n  driveCount: 7\n",
        )
        .unwrap();
        assert_eq!(config.drive_count_for("n"), 1);
    }

    #[test]
    fn from_file_errors() {
        let err = FleetConfig::from_file("/nonexistent/fleet.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }), "{err}");

        let mut file = NamedUtf8TempFile::new().unwrap();
        writeln!(file, "defaultDriveCount: [1, 2").unwrap();
        let err = FleetConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err}");

        let mut file = NamedUtf8TempFile::new().unwrap();
        writeln!(file, "defaultDriveSize: lots").unwrap();
        let err = FleetConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err}");
    }
}
