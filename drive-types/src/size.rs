// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drive capacities written with a unit suffix.

use bytesize::ByteSize;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;
const TIB: u64 = 1 << 40;

// Largest first; `Display` picks the first unit that divides evenly.
const BINARY_UNITS: [(&str, u64); 4] =
    [("Ti", TIB), ("Gi", GIB), ("Mi", MIB), ("Ki", KIB)];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid size {input:?}: {reason}")]
pub struct ParseSizeError {
    pub input: String,
    pub reason: String,
}

/// A capacity in bytes, parsed from strings such as `30Mi`, `1Gi` or `100M`.
///
/// Parsing is that of [ByteSize]: binary (`Ki`, `Mi`, ...) and decimal
/// (`K`, `M`, ...) suffixes, optionally followed by `B`, and bare byte
/// counts. Sizes print in the largest binary unit that represents them
/// exactly, so `"1024Ki"` prints as `"1Mi"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DriveSize(u64);

impl DriveSize {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * MIB)
    }

    pub const fn to_bytes(self) -> u64 {
        self.0
    }
}

impl From<ByteSize> for DriveSize {
    fn from(size: ByteSize) -> Self {
        Self(size.as_u64())
    }
}

impl FromStr for DriveSize {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<ByteSize>()
            .map(DriveSize::from)
            .map_err(|reason| ParseSizeError { input: s.to_string(), reason })
    }
}

impl fmt::Display for DriveSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 != 0 {
            for (suffix, unit) in BINARY_UNITS {
                if self.0 % unit == 0 {
                    return write!(f, "{}{suffix}", self.0 / unit);
                }
            }
        }
        write!(f, "{}", self.0)
    }
}

impl Serialize for DriveSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DriveSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SizeVisitor;

        impl Visitor<'_> for SizeVisitor {
            type Value = DriveSize;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a byte count or a size such as \"30Mi\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<DriveSize, E> {
                Ok(DriveSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<DriveSize, E> {
                u64::try_from(v).map(DriveSize).map_err(|_| {
                    E::invalid_value(de::Unexpected::Signed(v), &self)
                })
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<DriveSize, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}
