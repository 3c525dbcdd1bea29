// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::host::{
    error::ExecutionError, input::Input, output::output_to_exec_error,
    output::Output, output::OutputExt,
};

use itertools::Itertools;
use slog::{debug, error, warn, Logger};
use std::collections::VecDeque;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub fn command_to_string(command: &Command) -> String {
    Input::from(command).to_string()
}

fn log_command(log: &Logger, id: u64, command: &Command) {
    let input = Input::from(command);
    debug!(
        log,
        "Running host command";
        "id" => id,
        "program" => &input.program,
        "args" => input.args.join(" "),
    );
}

fn log_result(log: &Logger, id: u64, output: &Output) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        debug!(
            log,
            "Host command succeeded";
            "id" => id,
            "stdout" => stdout.trim(),
        );
        return;
    }
    // No exit code means the command was killed by a signal.
    let status = match output.status.code() {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    };
    warn!(
        log,
        "Host command failed";
        "id" => id,
        "status" => status,
        "stdout" => stdout.trim(),
        "stderr" => String::from_utf8_lossy(&output.stderr).trim(),
    );
}

/// Describes the commonly-used "safe-to-reference" type describing the
/// Executor as a trait object.
pub type BoxedExecutor = Arc<dyn Executor>;

/// Describes an "executor", which can run [Command]s and return a response.
///
/// - In production, this is usually simply a [HostExecutor].
/// - Under test, this can be customized, and a [FakeExecutor] may be used.
///
/// Execution blocks the caller until the command exits. There is no timeout.
pub trait Executor: Send + Sync {
    /// Executes a task, waiting for it to complete, and returning output.
    ///
    /// A non-zero exit status is reported as
    /// [ExecutionError::CommandFailure].
    fn execute(&self, command: &mut Command) -> Result<Output, ExecutionError>;
}

/// Handler called in place of running a command on a [FakeExecutor].
pub type HandlerFn = dyn FnMut(&Command) -> Output + Send + Sync;
pub type BoxedHandler = Box<HandlerFn>;

/// An executor which can expect certain inputs, and respond with specific
/// outputs.
pub struct FakeExecutor {
    log: Logger,
    counter: AtomicU64,
    handler: Mutex<BoxedHandler>,
}

impl FakeExecutor {
    pub fn new(log: Logger) -> Arc<FakeExecutor> {
        Arc::new(Self {
            log,
            counter: AtomicU64::new(0),
            handler: Mutex::new(Box::new(|_cmd| Output::success())),
        })
    }

    /// Set the request handler to an arbitrary function.
    pub fn set_handler(&self, f: BoxedHandler) {
        *self.handler.lock().unwrap() = f;
    }

    /// Perform some type coercion to access a commonly-used trait object.
    pub fn as_executor(self: Arc<Self>) -> BoxedExecutor {
        self
    }
}

impl Executor for FakeExecutor {
    fn execute(&self, command: &mut Command) -> Result<Output, ExecutionError> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        log_command(&self.log, id, command);

        let output = self.handler.lock().unwrap()(&*command);
        log_result(&self.log, id, &output);

        if !output.status.success() {
            return Err(output_to_exec_error(
                command_to_string(command),
                &output,
            ));
        }
        Ok(output)
    }
}

pub struct HostExecutor {
    log: slog::Logger,
    counter: std::sync::atomic::AtomicU64,
}

impl HostExecutor {
    pub fn new(log: Logger) -> Arc<Self> {
        Arc::new(Self { log, counter: AtomicU64::new(0) })
    }

    pub fn as_executor(self: Arc<Self>) -> BoxedExecutor {
        self
    }

    fn prepare(&self, command: &Command) -> u64 {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        log_command(&self.log, id, command);
        id
    }

    fn finalize(
        &self,
        command: &Command,
        id: u64,
        output: Output,
    ) -> Result<Output, ExecutionError> {
        log_result(&self.log, id, &output);
        if !output.status.success() {
            return Err(output_to_exec_error(
                command_to_string(command),
                &output,
            ));
        }
        Ok(output)
    }
}

impl Executor for HostExecutor {
    fn execute(&self, command: &mut Command) -> Result<Output, ExecutionError> {
        let id = self.prepare(command);
        let output = command.output().map_err(|err| {
            error!(self.log, "Could not start program!"; "id" => id);
            ExecutionError::ExecutionStart {
                command: command_to_string(command),
                err,
            }
        })?;
        self.finalize(command, id, output)
    }
}

type DynamicHandler = Box<dyn FnMut(Input) -> Output + Send + Sync>;

enum HandledCommand {
    Static { input: Input, output: Output },
    Dynamic { handler: DynamicHandler },
}

impl HandledCommand {
    fn describe(&self) -> String {
        match self {
            HandledCommand::Static { input, .. } => input.to_string(),
            HandledCommand::Dynamic { .. } => "<dynamic handler>".to_string(),
        }
    }
}

/// A handler that may be used for setting inputs/outputs to the executor
/// when these commands are known ahead-of-time.
///
/// Commands must arrive in exactly the order they were registered. An
/// unexpected command panics with the commands seen so far, and dropping
/// the handler with commands left over panics with the full remainder.
///
/// See: [Self::register] for integration with a [FakeExecutor].
#[derive(Default)]
pub struct StaticHandler {
    pending: VecDeque<HandledCommand>,
    seen: Vec<Input>,
}

impl StaticHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs this handler on `executor`, replacing the previous one.
    pub fn register(mut self, executor: &FakeExecutor) {
        executor.set_handler(Box::new(move |command| -> Output {
            self.execute(command)
        }));
    }

    /// Expects exactly `input`, answering with `output`.
    pub fn expect(&mut self, input: Input, output: Output) {
        self.pending.push_back(HandledCommand::Static { input, output });
    }

    /// Expects the command line `input` and reports success.
    pub fn expect_ok<S: AsRef<str>>(&mut self, input: S) {
        self.expect(Input::shell(input), Output::success())
    }

    /// Expects the command line `input` and reports failure.
    pub fn expect_fail<S: AsRef<str>>(&mut self, input: S) {
        self.expect(Input::shell(input), Output::failure())
    }

    /// Expects any one command, answered by whatever `handler` returns.
    pub fn expect_dynamic(&mut self, handler: DynamicHandler) {
        self.pending.push_back(HandledCommand::Dynamic { handler });
    }

    fn history(&self) -> String {
        if self.seen.is_empty() {
            return "none".to_string();
        }
        self.seen.iter().join(", ")
    }

    fn execute(&mut self, command: &Command) -> Output {
        let observed = Input::from(command);
        let position = self.seen.len();
        let Some(next) = self.pending.pop_front() else {
            panic!(
                "Unexpected command #{position}: {observed}\n\
                 No more commands were expected. Already ran: {}",
                self.history(),
            );
        };
        let output = match next {
            HandledCommand::Static { input, output } => {
                assert_eq!(
                    observed,
                    input,
                    "Command #{position} did not match. Already ran: {}",
                    self.history(),
                );
                output
            }
            HandledCommand::Dynamic { mut handler } => {
                handler(observed.clone())
            }
        };
        self.seen.push(observed);
        output
    }
}

impl Drop for StaticHandler {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let remaining = self
            .pending
            .iter()
            .map(|command| format!("  {}", command.describe()))
            .join("\n");
        let errmsg = format!(
            "{} expected command(s) never ran after {} command(s):\n\
             {remaining}",
            self.pending.len(),
            self.seen.len(),
        );
        if std::thread::panicking() {
            eprintln!("{errmsg}");
        } else {
            panic!("{errmsg}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use loopback_test_utils::dev::test_setup_log;

    #[test]
    fn fake_executor_reports_failure_as_error() {
        let logctx = test_setup_log("fake_executor_reports_failure_as_error");
        let executor = FakeExecutor::new(logctx.log.clone());
        let mut handler = StaticHandler::new();
        handler.expect_ok("losetup -d /dev/loop0");
        handler.expect(
            Input::shell("losetup -d /dev/loop1"),
            Output::failure().with_stderr("no such device"),
        );
        handler.register(&executor);

        let executor = executor.as_executor();
        executor
            .execute(Command::new("losetup").args(["-d", "/dev/loop0"]))
            .expect("first detach should succeed");
        let err = executor
            .execute(Command::new("losetup").args(["-d", "/dev/loop1"]))
            .expect_err("second detach should fail");
        match err {
            ExecutionError::CommandFailure(info) => {
                assert_eq!(info.command, "losetup -d /dev/loop1");
                assert_eq!(info.stderr, "no such device");
            }
            other => panic!("unexpected error: {other}"),
        }

        logctx.cleanup_successful();
    }

    fn discard_log() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    #[should_panic(expected = "Command #1 did not match. Already ran: \
                               losetup -j /images/a.img")]
    fn mismatched_command_names_its_position() {
        let executor = FakeExecutor::new(discard_log());
        let mut handler = StaticHandler::new();
        handler.expect_ok("losetup -j /images/a.img");
        handler.expect_ok("rm -f /images/a.img");
        handler.register(&executor);

        let executor = executor.as_executor();
        executor
            .execute(Command::new("losetup").args(["-j", "/images/a.img"]))
            .unwrap();
        let _ = executor
            .execute(Command::new("rm").args(["-f", "/images/b.img"]));
    }

    #[test]
    #[should_panic(expected = "2 expected command(s) never ran after 1 \
                               command(s):\n  rm -f /images/a.img\n  \
                               <dynamic handler>")]
    fn leftover_commands_are_listed_on_drop() {
        let executor = FakeExecutor::new(discard_log());
        let mut handler = StaticHandler::new();
        handler.expect_ok("losetup -j /images/a.img");
        handler.expect_ok("rm -f /images/a.img");
        handler.expect_dynamic(Box::new(|_| Output::success()));
        handler.register(&executor);

        executor
            .execute(Command::new("losetup").args(["-j", "/images/a.img"]))
            .unwrap();
        drop(executor);
    }

    #[test]
    fn dynamic_handler_sees_observed_input() {
        let logctx = test_setup_log("dynamic_handler_sees_observed_input");
        let executor = FakeExecutor::new(logctx.log.clone());
        let mut handler = StaticHandler::new();
        handler.expect_dynamic(Box::new(|input| {
            assert_eq!(input.program, "echo");
            Output::success().with_stdout(input.args.join(" "))
        }));
        handler.register(&executor);

        let output = executor
            .execute(Command::new("echo").args(["hello", "world"]))
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello world");

        logctx.cleanup_successful();
    }
}
