//! Line-oriented text filters applied to captured command output
//!
//! A filter reads a complete buffer line by line and writes a transformed
//! buffer. Filters are chained in insertion order by [`FilterChain`]: the
//! output of one stage is the input of the next.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use log::debug;
use regex::bytes::Regex;
use thiserror::Error;

pub mod grep;
pub mod sed;

pub use grep::Grep;
pub use sed::Sed;

/// A pattern that failed to compile.
///
/// Cloneable and comparable so a cached failure can be handed out repeatedly
/// and still compare equal to the first one.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to compile pattern '{pattern}': {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// Errors that can occur while applying a single filter
#[derive(Error, Debug)]
pub enum FilterError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("failed to write filtered output: {0}")]
    Io(#[from] io::Error),
}

/// A transformation over line-delimited text.
///
/// `Display` is used to identify the filter when a chain stage fails.
pub trait Filter: fmt::Debug + fmt::Display + Send + Sync {
    /// Read all of `src` and write the transformed text to `dst`.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Pattern` if the filter's pattern is invalid, or
    /// `FilterError::Io` if reading the source or writing the destination fails.
    fn apply(&self, dst: &mut dyn Write, src: &mut dyn BufRead) -> Result<(), FilterError>;
}

/// Compile a pattern for matching against raw output bytes.
///
/// # Errors
///
/// Returns `PatternError` if the pattern is not a valid regex.
pub fn compile(pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(pattern).map_err(|source| PatternError {
        pattern: pattern.to_string(),
        source,
    })
}

/// Call `f` with every line of `src`, without its line ending.
///
/// A trailing `\r` is dropped along with the `\n`. A final line without a
/// newline still counts; empty input yields no lines.
pub(crate) fn for_each_line(
    src: &mut dyn BufRead,
    mut f: impl FnMut(&[u8]) -> io::Result<()>,
) -> io::Result<()> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if src.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        f(trim_line_ending(&line))?;
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// A chain stage that failed
#[derive(Error, Debug)]
#[error("failed to apply filter {filter}: {source}")]
pub struct ChainError {
    /// Zero-based position of the failing filter in the chain
    pub stage: usize,
    /// Description of the failing filter
    pub filter: String,
    #[source]
    pub source: FilterError,
}

/// Ordered pipeline of filters.
///
/// Cloning a chain shares the filter instances, so any state a filter keeps
/// (such as a compiled pattern) is shared as well.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Filter>> {
        self.filters.iter()
    }

    /// Run `input` through every filter in order and return the last stage's output.
    ///
    /// An empty chain returns `input` unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ChainError` for the first stage that fails; later stages do not run.
    pub fn apply(&self, input: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        self.filters
            .iter()
            .enumerate()
            .try_fold(input, |src, (stage, filter)| {
                let mut dst = Vec::with_capacity(src.len());
                filter
                    .apply(&mut dst, &mut src.as_slice())
                    .map_err(|source| ChainError {
                        stage,
                        filter: filter.to_string(),
                        source,
                    })?;
                debug!(
                    "Filter {filter} reduced {} bytes to {} bytes",
                    src.len(),
                    dst.len()
                );
                Ok(dst)
            })
    }
}

impl FromIterator<Arc<dyn Filter>> for FilterChain {
    fn from_iter<T: IntoIterator<Item = Arc<dyn Filter>>>(iter: T) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}
