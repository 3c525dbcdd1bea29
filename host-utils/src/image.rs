// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utilities for managing the regular files which back loop devices.

use crate::host::BoxedExecutor;
use crate::ExecutionError;
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Command;

pub const FALLOCATE: &str = "fallocate";
pub const RM: &str = "rm";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to create image file {path}: {err}")]
    Create {
        path: Utf8PathBuf,
        #[source]
        err: ExecutionError,
    },

    #[error("Failed to delete image file {path}: {err}")]
    Delete {
        path: Utf8PathBuf,
        #[source]
        err: ExecutionError,
    },
}

/// Creates and deletes image files through an executor.
#[derive(Clone)]
pub struct ImageFiles {
    executor: BoxedExecutor,
}

impl ImageFiles {
    pub fn new(executor: BoxedExecutor) -> Self {
        Self { executor }
    }

    /// `fallocate -l <size> <path>`
    pub fn create(&self, path: &Utf8Path, size: u64) -> Result<(), Error> {
        let mut cmd = Command::new(FALLOCATE);
        cmd.arg("-l").arg(size.to_string()).arg(path);
        self.executor
            .execute(&mut cmd)
            .map_err(|err| Error::Create { path: path.to_owned(), err })?;
        Ok(())
    }

    /// `rm -f <path>`
    ///
    /// Deleting a file which does not exist succeeds.
    pub fn delete(&self, path: &Utf8Path) -> Result<(), Error> {
        let mut cmd = Command::new(RM);
        cmd.arg("-f").arg(path);
        self.executor
            .execute(&mut cmd)
            .map_err(|err| Error::Delete { path: path.to_owned(), err })?;
        Ok(())
    }
}
