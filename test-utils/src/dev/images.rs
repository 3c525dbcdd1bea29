// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scratch directories standing in for a node's image directory.

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use std::fs::File;

/// A temporary directory which is removed when dropped.
pub struct ImageDir {
    dir: Utf8TempDir,
}

impl ImageDir {
    pub fn new() -> Self {
        let dir = camino_tempfile::Builder::new()
            .prefix("loopback-images-")
            .tempdir()
            .expect("Failed to create temporary image directory");
        Self { dir }
    }

    pub fn path(&self) -> &Utf8Path {
        self.dir.path()
    }

    /// Creates an empty file called `name`.
    pub fn touch(&self, name: &str) -> Utf8PathBuf {
        self.create(name, 0)
    }

    /// Creates a sparse file called `name` which is `len` bytes long.
    pub fn create(&self, name: &str, len: u64) -> Utf8PathBuf {
        let path = self.dir.path().join(name);
        let file = File::create(&path)
            .unwrap_or_else(|e| panic!("Failed to create {path}: {e}"));
        file.set_len(len)
            .unwrap_or_else(|e| panic!("Failed to size {path}: {e}"));
        path
    }
}

impl Default for ImageDir {
    fn default() -> Self {
        Self::new()
    }
}
