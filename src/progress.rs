//! Progress indicators shown while a command runs

use std::fmt;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use anstyle::Reset;
use log::debug;
use tokio::task::JoinHandle;

use crate::theme;

static SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_INTERVAL: Duration = Duration::from_millis(100);

/// Something that renders while a command is running.
///
/// A run calls `start` once before the process is spawned and `stop` once
/// after it exits or is cancelled.
pub trait ProgressIndicator: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

type MakeIndicator = dyn Fn() -> Box<dyn ProgressIndicator> + Send + Sync;

/// Creates a fresh indicator for every run of a command
#[derive(Clone)]
pub struct ProgressFactory(Arc<MakeIndicator>);

impl ProgressFactory {
    pub fn new<F, P>(make: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: ProgressIndicator + 'static,
    {
        Self(Arc::new(move || Box::new(make()) as Box<dyn ProgressIndicator>))
    }

    #[must_use]
    pub fn create(&self) -> Box<dyn ProgressIndicator> {
        (self.0)()
    }
}

impl Default for ProgressFactory {
    fn default() -> Self {
        Self::new(Spinner::new)
    }
}

impl fmt::Debug for ProgressFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressFactory")
    }
}

/// Terminal spinner drawn on stderr.
///
/// Draws nothing when stderr is not a terminal or when no tokio runtime is
/// available to drive the animation.
#[derive(Debug, Default)]
pub struct Spinner {
    task: Option<JoinHandle<()>>,
}

impl Spinner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressIndicator for Spinner {
    fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        if !std::io::stderr().is_terminal() {
            debug!("stderr is not a terminal, spinner disabled");
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No tokio runtime, spinner disabled");
            return;
        };
        self.task = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(SPINNER_INTERVAL);
            for frame in SPINNER_FRAMES.iter().cycle() {
                ticker.tick().await;
                let mut stderr = std::io::stderr().lock();
                let _ = write!(stderr, "\r{}{frame}{Reset}", theme::ACCENT);
                let _ = stderr.flush();
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "\r\x1b[2K");
            let _ = stderr.flush();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl ProgressIndicator for Counting {
        fn start(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn stop(&mut self) {}
    }

    #[test]
    fn test_factory_creates_new_indicator_each_time() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let factory = ProgressFactory::new(move || Counting(Arc::clone(&counter)));
        factory.create().start();
        factory.clone().create().start();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_spinner_without_runtime_is_inert() {
        let mut spinner = Spinner::new();
        spinner.start();
        spinner.stop();
        assert!(spinner.task.is_none());
    }
}
