// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utilities for managing loop devices.

use crate::host::BoxedExecutor;
use crate::ExecutionError;
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Command;

pub const LOSETUP: &str = "losetup";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to attach loop device for {file}: {err}")]
    Attach {
        file: Utf8PathBuf,
        #[source]
        err: ExecutionError,
    },

    #[error("Failed to detach loop device {device}: {err}")]
    Detach {
        device: Utf8PathBuf,
        #[source]
        err: ExecutionError,
    },

    #[error("Failed to look up loop device for {file}: {err}")]
    Lookup {
        file: Utf8PathBuf,
        #[source]
        err: ExecutionError,
    },
}

/// Parses the output of `losetup -j <file>`.
///
/// Each attachment is reported on its own line as
/// `<device>: [<backing device>]:<inode> (<file>)`; some versions omit the
/// inode and print `<device>: []: (<file>)`. Returns the device of the first
/// line with that shape, or `None` if there is none.
pub fn parse_attached_device(output: &str) -> Option<Utf8PathBuf> {
    output.lines().find_map(|line| {
        let line = line.trim();
        let (device, rest) = line.split_once(": ")?;
        let rest = rest.strip_prefix('[')?;
        let (_backing, rest) = rest.split_once(']')?;
        let rest = rest.strip_prefix(':')?;
        let (_inode, file) = rest.split_once('(')?;
        if device.is_empty() || file.len() < 2 || !file.ends_with(')') {
            return None;
        }
        Some(Utf8PathBuf::from(device))
    })
}

/// Wraps `losetup`, running it through an executor.
#[derive(Clone)]
pub struct Losetup {
    executor: BoxedExecutor,
}

impl Losetup {
    pub fn new(executor: BoxedExecutor) -> Self {
        Self { executor }
    }

    /// `losetup --find --show --partscan <file>`
    ///
    /// Returns the path of the loop device the file was attached to.
    pub fn attach(&self, file: &Utf8Path) -> Result<Utf8PathBuf, Error> {
        let mut cmd = Command::new(LOSETUP);
        cmd.args(["--find", "--show", "--partscan"]).arg(file);
        let output = self
            .executor
            .execute(&mut cmd)
            .map_err(|err| Error::Attach { file: file.to_owned(), err })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
            Some(device) => Ok(Utf8PathBuf::from(device)),
            None => Err(Error::Attach {
                file: file.to_owned(),
                err: ExecutionError::ParseFailure(
                    "losetup did not report a device".to_string(),
                ),
            }),
        }
    }

    /// `losetup -d <device>`
    pub fn detach(&self, device: &Utf8Path) -> Result<(), Error> {
        let mut cmd = Command::new(LOSETUP);
        cmd.arg("-d").arg(device);
        self.executor
            .execute(&mut cmd)
            .map_err(|err| Error::Detach { device: device.to_owned(), err })?;
        Ok(())
    }

    /// `losetup -j <file>`
    ///
    /// Returns `Ok(None)` if `file` is not attached to any loop device.
    pub fn find_device_for(
        &self,
        file: &Utf8Path,
    ) -> Result<Option<Utf8PathBuf>, Error> {
        let mut cmd = Command::new(LOSETUP);
        cmd.arg("-j").arg(file);
        let output = self
            .executor
            .execute(&mut cmd)
            .map_err(|err| Error::Lookup { file: file.to_owned(), err })?;
        Ok(parse_attached_device(&String::from_utf8_lossy(&output.stdout)))
    }
}
