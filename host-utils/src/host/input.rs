// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use itertools::Itertools;
use std::fmt;
use std::process::Command;

/// The program and arguments of a command, detached from the [Command]
/// itself so it can be compared and printed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Input {
    pub program: String,
    pub args: Vec<String>,
}

impl Input {
    pub fn new<P, A, S>(program: P, args: A) -> Self
    where
        P: AsRef<str>,
        A: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            program: program.as_ref().to_string(),
            args: args.into_iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Short-hand for a whitespace-separated command line.
    ///
    /// There is no quoting; arguments containing whitespace cannot be
    /// expressed this way.
    pub fn shell<S: AsRef<str>>(input: S) -> Self {
        let mut words = input.as_ref().split_whitespace();
        let program = words.next().unwrap_or_default();
        Self::new(program, words)
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        if !self.args.is_empty() {
            write!(f, " {}", self.args.iter().join(" "))?;
        }
        Ok(())
    }
}

impl From<&Command> for Input {
    fn from(command: &Command) -> Self {
        Self {
            program: command.get_program().to_string_lossy().to_string(),
            args: command
                .get_args()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect(),
        }
    }
}
