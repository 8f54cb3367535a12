//! Building and running external commands
//!
//! A [`Command`] only accumulates configuration. [`Command::run`] copies that
//! configuration into a private execution snapshot, so changing or re-running
//! the builder never affects a run that is already in flight. The snapshot
//! spawns the process, captures its output, stops the progress indicator and
//! finally passes the captured buffer through the filter chain.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::filter::ChainError;

pub mod command;
mod exec;
pub mod result;

pub use command::{Command, Input};
pub use result::{CommandResult, DecodeError};

/// Ways the external process step of a run can fail
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to open stdin file {path:?}: {source}")]
    StdinFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write stdin: {0}")]
    Stdin(#[source] io::Error),
    #[error("failed to read process output: {0}")]
    Capture(#[source] io::Error),
    #[error("failed to wait for process: {0}")]
    Wait(#[source] io::Error),
    #[error("process exited with {0}")]
    Exit(ExitStatus),
    #[error("process was cancelled")]
    Cancelled,
}

/// Errors returned by [`Command::run`]
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("command has an empty program path")]
    EmptyProgram,
    /// The process failed and the command was set to bail on errors.
    /// Whatever was captured before the failure is kept in `output`.
    #[error("failed to execute command: {source}")]
    Process {
        #[source]
        source: ProcessError,
        output: CommandResult,
    },
    #[error(transparent)]
    Filter(#[from] ChainError),
}

impl CommandError {
    /// Output captured before a bailed process failure, unfiltered.
    #[must_use]
    pub fn partial_output(&self) -> Option<&CommandResult> {
        match self {
            CommandError::Process { output, .. } => Some(output),
            _ => None,
        }
    }
}
