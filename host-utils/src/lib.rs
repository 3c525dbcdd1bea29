// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wrappers around the host commands needed to run loopback drives.

pub mod host;
pub mod image;
pub mod losetup;

pub use host::error::{CommandFailureInfo, ExecutionError};
