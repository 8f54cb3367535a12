//! Scripting helpers for running external commands
//!
//! Build a [`Command`] declaratively, run it once, and get its captured
//! output back after it has been passed through a chain of line filters
//! (grep-style matching and sed-style substitution). A run can be cancelled
//! through a [`CancellationToken`] and can show a progress spinner while the
//! process is running.

use std::path::Path;

use log::debug;

use crate::config_file::{ConfigError, Recipe};

pub mod cancel;
pub mod cmd;
pub mod config_file;
pub mod filter;
pub mod logger;
pub mod progress;
pub mod theme;

pub use cancel::CancellationToken;
pub use cmd::{Command, CommandError, CommandResult, Input, ProcessError};
pub use filter::{Filter, FilterChain, Grep, Sed};

/// Run `program` with `args`, without capturing anything, and fail if it fails.
///
/// # Errors
///
/// Returns `CommandError::Process` if the process cannot be spawned or exits
/// unsuccessfully.
pub async fn exec<I, S>(program: &str, args: I) -> Result<(), CommandError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Command::new(program)
        .args(args)
        .bail_on_error(true)
        .run(None)
        .await
        .map(|_| ())
}

/// Load a recipe file and turn it into a ready-to-run `Command`.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, or describes
/// an invalid command.
pub fn load_recipe(path: &Path) -> Result<Command, ConfigError> {
    debug!("Loading recipe from {}", path.display());
    Command::try_from(Recipe::from_file(path)?)
}
