// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cluster-visible records of the drives, volumes, available capacity and
//! logical volume groups on each node, and the queries controllers run over
//! them.

pub mod client;
pub mod fakes;
pub mod helper;
pub mod records;

pub use client::{ClientError, RecordClient, RecordKind};
pub use helper::{CrHelper, Error};
