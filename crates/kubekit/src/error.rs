//! Error types for rollout operations.
//!
//! Only fatal conditions become errors. Teardown failures are tolerated by the
//! orchestrator and never surface here.

use crate::types::{CommandInvocation, Failure, Phase};
use thiserror::Error;

/// Errors that abort a rollout.
#[derive(Debug, Error)]
pub enum Error {
    /// A single command failed
    #[error("command failed: {invocation} ({failure})")]
    CommandFailed {
        /// The command that was run
        invocation: CommandInvocation,
        /// Why it failed
        failure: Failure,
        /// Combined output of the failed command
        output: String,
    },

    /// Every attempt of a retried command failed
    #[error("{invocation} failed after {attempts} attempt(s): {last}")]
    RetryExhausted {
        /// The command that was retried
        invocation: CommandInvocation,
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        last: Box<Error>,
    },

    /// The pod lookup produced no pod name
    #[error("no pod found matching selector '{selector}'")]
    PodNotFound {
        /// Label selector that matched nothing
        selector: String,
    },

    /// A rollout phase failed
    #[error("{phase} failed: {source}")]
    Step {
        /// The phase that was running
        phase: Phase,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the phase it happened in.
    pub fn in_phase(self, phase: Phase) -> Self {
        Error::Step {
            phase,
            source: Box::new(self),
        }
    }

    /// The phase a step error happened in.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Step { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Combined output of the command behind this error, if any.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { output, .. } => Some(output),
            Error::RetryExhausted { last, .. } => last.command_output(),
            Error::Step { source, .. } => source.command_output(),
            _ => None,
        }
    }
}

/// Result type for rollout operations.
pub type Result<T> = std::result::Result<T, Error>;
