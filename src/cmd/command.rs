use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cancel::CancellationToken;
use crate::filter::{Filter, FilterChain, Grep, Sed};
use crate::progress::{ProgressFactory, ProgressIndicator};

use super::exec::Execution;
use super::{CommandError, CommandResult};

pub(crate) type SharedReader = Arc<Mutex<Box<dyn Read + Send>>>;

/// Source piped to a command's stdin
#[derive(Clone)]
pub enum Input {
    Bytes(Arc<[u8]>),
    /// Opened for every run and handed to the process directly
    File(PathBuf),
    /// Shared between runs: a second run only sees what the first left unread
    Reader(SharedReader),
}

impl Input {
    /// Wrap a blocking reader so it can be shared between runs.
    pub fn reader<R: Read + Send + 'static>(reader: R) -> Self {
        Input::Reader(Arc::new(Mutex::new(Box::new(reader))))
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Input::File(path) => f.debug_tuple("File").field(path).finish(),
            Input::Reader(_) => f.write_str("Reader"),
        }
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::Bytes(Arc::from(s.as_bytes()))
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::Bytes(Arc::from(s.into_bytes()))
    }
}

impl From<&[u8]> for Input {
    fn from(bytes: &[u8]) -> Self {
        Input::Bytes(Arc::from(bytes))
    }
}

impl From<Vec<u8>> for Input {
    fn from(bytes: Vec<u8>) -> Self {
        Input::Bytes(Arc::from(bytes))
    }
}

/// Declarative description of an external command and what to do with its output.
///
/// Every setter changes the builder in place and returns it for chaining;
/// nothing runs until [`Command::run`]. Output is only filtered when stdout
/// and/or stderr is captured.
///
/// ```no_run
/// # async fn demo() -> Result<(), scripting::cmd::CommandError> {
/// let result = scripting::Command::new("ls")
///     .arg("-l")
///     .capture_stdout(true)
///     .grep(r"_test\.rs$")
///     .run(None)
///     .await?;
/// println!("{}", result.output_string());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Command {
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
    pub(crate) bail_on_error: bool,
    pub(crate) capture_stdout: bool,
    pub(crate) capture_stderr: bool,
    pub(crate) filters: FilterChain,
    pub(crate) stdin: Option<Input>,
    pub(crate) progress: Option<ProgressFactory>,
}

impl Command {
    /// Create a command for `program`. Bails on process errors by default.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            bail_on_error: true,
            capture_stdout: false,
            capture_stderr: false,
            filters: FilterChain::new(),
            stdin: None,
            progress: None,
        }
    }

    /// Append one argument.
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments in order.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// When false, a failed process is logged and its output is still filtered.
    pub fn bail_on_error(&mut self, bail: bool) -> &mut Self {
        self.bail_on_error = bail;
        self
    }

    /// Collect stdout into the result instead of inheriting it.
    pub fn capture_stdout(&mut self, capture: bool) -> &mut Self {
        self.capture_stdout = capture;
        self
    }

    /// Collect stderr into the result; shares the buffer with stdout when both are captured.
    pub fn capture_stderr(&mut self, capture: bool) -> &mut Self {
        self.capture_stderr = capture;
        self
    }

    /// Show the default terminal spinner while the process runs.
    pub fn progress(&mut self, show: bool) -> &mut Self {
        self.progress = show.then(ProgressFactory::default);
        self
    }

    /// Show a custom indicator, created fresh for each run.
    pub fn progress_with<F, P>(&mut self, make: F) -> &mut Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: ProgressIndicator + 'static,
    {
        self.progress = Some(ProgressFactory::new(make));
        self
    }

    /// Pipe in-memory input to the process.
    pub fn stdin(&mut self, input: impl Into<Input>) -> &mut Self {
        self.stdin = Some(input.into());
        self
    }

    /// Stream a reader to the process in chunks as it produces data.
    pub fn stdin_reader<R: Read + Send + 'static>(&mut self, reader: R) -> &mut Self {
        self.stdin = Some(Input::reader(reader));
        self
    }

    /// Use a file as the process's stdin.
    pub fn stdin_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.stdin = Some(Input::File(path.into()));
        self
    }

    /// Keep only output lines matching `pattern`.
    ///
    /// Remember to capture stdout and/or stderr, otherwise there is nothing
    /// to filter.
    pub fn grep(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.filter(Grep::new(pattern))
    }

    /// Replace every match of `pattern` with the literal `replace`.
    pub fn sed(&mut self, pattern: impl Into<String>, replace: impl Into<String>) -> &mut Self {
        self.filter(Sed::new(pattern, replace))
    }

    /// Append a filter to the end of the chain.
    pub fn filter<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filter_shared(Arc::new(filter))
    }

    /// Append a filter instance that may also be used elsewhere.
    pub fn filter_shared(&mut self, filter: Arc<dyn Filter>) -> &mut Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// Run the command once and return its filtered output.
    ///
    /// Without a token the run can only end by the process exiting.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::EmptyProgram` if no program was given,
    /// `CommandError::Process` if the process failed while bailing on errors
    /// (with the partial output attached), or `CommandError::Filter` if a
    /// filter stage failed.
    pub async fn run(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<CommandResult, CommandError> {
        let token = cancel.cloned().unwrap_or_default();
        Execution::from(self).run(token).await
    }
}
