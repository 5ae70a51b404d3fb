//! Real subprocess backend.

use crate::backend::Executor;
use crate::types::{CommandInvocation, CommandOutput, Failure};
use std::io::{self, Read};
use std::process::{Command, Stdio};

/// Executor that spawns real processes.
///
/// stdout and stderr share a single pipe, so the captured output keeps the
/// order in which the child wrote it.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    verbose: bool,
}

impl ProcessExecutor {
    /// Create an executor. When `verbose` is set, every invocation and its
    /// output are logged.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn spawn_and_collect(invocation: &CommandInvocation) -> io::Result<(Vec<u8>, Option<i32>, bool)> {
        let (mut reader, writer) = io::pipe()?;
        let stderr_writer = writer.try_clone()?;

        // The Command owns our copies of the write end; it must be dropped
        // before reading or the pipe never reaches EOF.
        let mut child = {
            let mut command = Command::new(invocation.program());
            command
                .args(invocation.args())
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(stderr_writer);
            command.spawn()?
        };

        let mut combined = Vec::new();
        reader.read_to_end(&mut combined)?;
        let status = child.wait()?;

        Ok((combined, status.code(), status.success()))
    }
}

impl Executor for ProcessExecutor {
    fn run(&self, invocation: &CommandInvocation) -> CommandOutput {
        if self.verbose {
            log::info!("running: {invocation}");
        }

        let output = match Self::spawn_and_collect(invocation) {
            Ok((combined, _, true)) => CommandOutput::success(combined),
            Ok((combined, code, false)) => CommandOutput::failed(combined, Failure::Exit(code)),
            Err(e) => CommandOutput::failed(Vec::new(), Failure::Launch(e.to_string())),
        };

        if self.verbose {
            let text = output.text();
            if !text.trim().is_empty() {
                log::info!("output:\n{}", text.trim_end());
            }
            if let Some(failure) = &output.failure {
                log::info!("{} -> {failure}", invocation.program());
            }
        }

        output
    }
}
