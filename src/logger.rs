use std::io::{IsTerminal, Write};
use std::time::Instant;

use anstyle::{Reset, Style};
use log::{Level, Log, Metadata, Record, SetLoggerError};
use parking_lot::Mutex;

use crate::theme;

struct ScriptingLogger {
    color: bool,
    file: Option<Mutex<std::fs::File>>,
    filter: log::LevelFilter,
    start: Instant,
}

impl Log for ScriptingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.start.elapsed().as_secs_f64();
        let level = if self.color {
            let style = level_style(record.level());
            format!("{style}{}{Reset}", record.level())
        } else {
            record.level().to_string()
        };
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{elapsed:.3}s] [{level}] {}: {}",
            record.target(),
            record.args()
        );

        if let Some(ref file) = self.file {
            let _ = writeln!(
                file.lock(),
                "[{elapsed:.3}s] [{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Install a logger that writes to stderr and, optionally, appends to `log_file`.
///
/// The level is read from `RUST_LOG` and defaults to `info`.
///
/// # Errors
///
/// Returns `SetLoggerError` if a logger is already installed.
pub fn init(log_file: Option<std::fs::File>) -> Result<(), SetLoggerError> {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(log::LevelFilter::Info);

    let logger = ScriptingLogger {
        color: std::io::stderr().is_terminal(),
        file: log_file.map(Mutex::new),
        filter,
        start: Instant::now(),
    };

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(filter);
    Ok(())
}

/// Style used for a log level on a terminal.
#[must_use]
pub fn level_style(level: Level) -> Style {
    match level {
        Level::Error => theme::FAILURE,
        Level::Warn => theme::WARNING,
        Level::Info => theme::INFO,
        Level::Debug | Level::Trace => theme::DIM,
    }
}
