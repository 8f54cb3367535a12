//! Declarative command recipes loaded from YAML or JSON

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cmd::Command;
use crate::filter::{self, Grep, Sed};

/// Errors that can occur while loading a recipe
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read recipe file {path}: {source}")]
    Read {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("Unable to parse YAML recipe file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON recipe file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Invalid regex pattern `{pattern}`: {source}")]
    Regex {
        source: regex::Error,
        pattern: String,
    },
    #[error("Invalid recipe: {0}")]
    Validation(String),
}

/// A filter stage in a recipe
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConfigFilter {
    Grep { pattern: String },
    Sed { pattern: String, replace: String },
}

impl ConfigFilter {
    fn pattern(&self) -> &str {
        match self {
            ConfigFilter::Grep { pattern } | ConfigFilter::Sed { pattern, .. } => pattern,
        }
    }
}

/// A command and its output handling, as written in a recipe file
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Recipe {
    /// Program followed by its arguments
    pub cmd: Vec<String>,
    pub bail_on_error: Option<bool>,
    pub capture_stdout: Option<bool>,
    pub capture_stderr: Option<bool>,
    pub progress: Option<bool>,
    /// Literal text piped to the command
    pub stdin: Option<String>,
    pub stdin_file: Option<PathBuf>,
    pub filters: Option<Vec<ConfigFilter>>,
}

impl Recipe {
    /// Loads and parses a recipe file. Files ending in `.json` are read as
    /// JSON, anything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Recipe, ConfigError> {
        let contents = std::fs::read_to_string(file).map_err(|source| ConfigError::Read {
            source,
            path: file.to_path_buf(),
        })?;
        debug!("Parsing recipe {}", file.display());
        if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })
        }
    }
}

/// Check that every filter pattern compiles.
///
/// # Errors
///
/// Returns `ConfigError::Regex` for the first invalid pattern.
pub fn validate_filters(filters: &[ConfigFilter]) -> Result<(), ConfigError> {
    for f in filters {
        filter::compile(f.pattern()).map_err(|e| ConfigError::Regex {
            source: e.source,
            pattern: e.pattern,
        })?;
    }
    Ok(())
}

impl TryFrom<Recipe> for Command {
    type Error = ConfigError;

    fn try_from(recipe: Recipe) -> Result<Self, Self::Error> {
        let mut argv = recipe.cmd.into_iter();
        let program = argv
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::Validation("`cmd` needs a program".to_string()))?;
        if recipe.stdin.is_some() && recipe.stdin_file.is_some() {
            return Err(ConfigError::Validation(
                "`stdin` and `stdin_file` are mutually exclusive".to_string(),
            ));
        }
        let filters = recipe.filters.unwrap_or_default();
        validate_filters(&filters)?;

        let mut command = Command::new(program);
        command
            .args(argv)
            .bail_on_error(recipe.bail_on_error.unwrap_or(true))
            .capture_stdout(recipe.capture_stdout.unwrap_or(false))
            .capture_stderr(recipe.capture_stderr.unwrap_or(false))
            .progress(recipe.progress.unwrap_or(false));
        if let Some(text) = recipe.stdin {
            command.stdin(text);
        }
        if let Some(path) = recipe.stdin_file {
            command.stdin_file(path);
        }
        for f in filters {
            match f {
                ConfigFilter::Grep { pattern } => command.filter(Grep::new(pattern)),
                ConfigFilter::Sed { pattern, replace } => {
                    command.filter(Sed::new(pattern, replace))
                }
            };
        }
        Ok(command)
    }
}
