//! Command execution abstraction.
//!
//! The [`Executor`] trait is the only place rollouts touch the outside world,
//! allowing for different implementations (real subprocesses, scripted fakes
//! for testing).

pub mod process;

use crate::error::{Error, Result};
use crate::types::{CommandInvocation, CommandOutput};

pub use process::ProcessExecutor;

/// Runs external commands.
pub trait Executor {
    /// Run a command to completion.
    ///
    /// Never fails past this boundary: launch errors and non-zero exits are
    /// reported through [`CommandOutput::failure`].
    fn run(&self, invocation: &CommandInvocation) -> CommandOutput;

    /// Run a command and turn a failure into an [`Error::CommandFailed`].
    ///
    /// Returns the combined output on success.
    fn run_checked(&self, invocation: &CommandInvocation) -> Result<String> {
        let output = self.run(invocation);
        let text = output.text();
        match output.failure {
            None => Ok(text),
            Some(failure) => Err(Error::CommandFailed {
                invocation: invocation.clone(),
                failure,
                output: text,
            }),
        }
    }
}

impl<E: Executor + ?Sized> Executor for &E {
    fn run(&self, invocation: &CommandInvocation) -> CommandOutput {
        (**self).run(invocation)
    }
}
