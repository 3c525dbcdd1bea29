// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executing commands on the host, or pretending to under test.

pub mod error;
mod executor;
mod input;
mod output;

pub use error::ExecutionError;
pub use executor::{
    command_to_string, BoxedExecutor, BoxedHandler, Executor, FakeExecutor,
    HostExecutor, StaticHandler,
};
pub use input::Input;
pub use output::{output_to_exec_error, Output, OutputExt};
