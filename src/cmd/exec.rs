use std::io::{self, Read};
use std::process::Stdio;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::filter::FilterChain;
use crate::progress::{ProgressFactory, ProgressIndicator};

use super::command::{Command, Input, SharedReader};
use super::{CommandError, CommandResult, ProcessError};

const CHUNK_SIZE: usize = 8192;
const STDIN_CHUNKS_IN_FLIGHT: usize = 4;

/// Snapshot of a [`Command`] taken when a run starts.
///
/// Owns copies of every setting, so the builder can be changed or run again
/// while this run is in progress.
pub(super) struct Execution {
    program: String,
    args: Vec<String>,
    bail_on_error: bool,
    capture_stdout: bool,
    capture_stderr: bool,
    filters: FilterChain,
    stdin: Option<Input>,
    progress: Option<ProgressFactory>,
}

impl From<&Command> for Execution {
    fn from(command: &Command) -> Self {
        Self {
            program: command.program.clone(),
            args: command.args.clone(),
            bail_on_error: command.bail_on_error,
            capture_stdout: command.capture_stdout,
            capture_stderr: command.capture_stderr,
            filters: command.filters.clone(),
            stdin: command.stdin.clone(),
            progress: command.progress.clone(),
        }
    }
}

impl Execution {
    pub(super) async fn run(self, token: CancellationToken) -> Result<CommandResult, CommandError> {
        if self.program.trim().is_empty() {
            return Err(CommandError::EmptyProgram);
        }
        debug!("Running '{}' with args {:?}", self.program, self.args);

        let mut output = (self.capture_stdout || self.capture_stderr).then(Vec::new);

        let (done_tx, progress_task) = match &self.progress {
            Some(factory) => {
                let (tx, rx) = oneshot::channel();
                let task = watch_progress(factory.create(), rx, token.clone());
                (Some(tx), Some(task))
            }
            None => (None, None),
        };

        let outcome = self.execute(&token, output.as_mut()).await;

        if let Some(tx) = done_tx {
            let _ = tx.send(());
        }
        if let Some(task) = progress_task
            && let Err(e) = task.await
        {
            warn!("Progress indicator task failed: {e}");
        }

        if let Err(source) = outcome {
            if self.bail_on_error {
                return Err(CommandError::Process {
                    source,
                    output: CommandResult::new(output),
                });
            }
            warn!("Ignoring failure of '{}': {source}", self.program);
        }

        let output = match output {
            Some(captured) => Some(self.filters.apply(captured)?),
            None => {
                if !self.filters.is_empty() {
                    debug!(
                        "Nothing captured for '{}', skipping {} filters",
                        self.program,
                        self.filters.len()
                    );
                }
                None
            }
        };
        Ok(CommandResult::new(output))
    }

    /// Spawn the process and wait for it, feeding stdin and capturing output
    /// concurrently, until it exits or `token` is cancelled.
    async fn execute(
        &self,
        token: &CancellationToken,
        output: Option<&mut Vec<u8>>,
    ) -> Result<(), ProcessError> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(self.stdin_stdio()?)
            .stdout(capture_stdio(self.capture_stdout))
            .stderr(capture_stdio(self.capture_stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut feeder = stdin
            .zip(self.stdin.clone())
            .map(|(pipe, input)| tokio::spawn(feed_stdin(pipe, input)));

        let outcome = tokio::select! {
            result = async {
                let (captured, status) = tokio::join!(
                    capture(stdout, stderr, output),
                    child.wait(),
                );
                let status = status.map_err(ProcessError::Wait)?;
                captured.map_err(ProcessError::Capture)?;
                if let Some(feeder) = feeder.as_mut()
                    && feeder.is_finished()
                {
                    feeder
                        .await
                        .map_err(|e| ProcessError::Stdin(io::Error::other(e)))??;
                }
                debug!("'{}' exited with {status}", self.program);
                if status.success() {
                    Ok(())
                } else {
                    Err(ProcessError::Exit(status))
                }
            } => result,
            () = token.cancelled() => {
                debug!("Run of '{}' cancelled, killing process", self.program);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill '{}': {e}", self.program);
                }
                Err(ProcessError::Cancelled)
            }
        };

        // The process is gone, so nothing is left to read the rest of stdin.
        if let Some(feeder) = feeder {
            feeder.abort();
        }
        outcome
    }

    fn stdin_stdio(&self) -> Result<Stdio, ProcessError> {
        match &self.stdin {
            None => Ok(Stdio::null()),
            Some(Input::File(path)) => std::fs::File::open(path)
                .map(Stdio::from)
                .map_err(|source| ProcessError::StdinFile {
                    path: path.clone(),
                    source,
                }),
            Some(Input::Bytes(_) | Input::Reader(_)) => Ok(Stdio::piped()),
        }
    }
}

fn capture_stdio(capture: bool) -> Stdio {
    if capture {
        Stdio::piped()
    } else {
        Stdio::inherit()
    }
}

/// Start `indicator` and stop it from a background task once the run is
/// done or cancelled, whichever happens first.
fn watch_progress(
    mut indicator: Box<dyn ProgressIndicator>,
    done: oneshot::Receiver<()>,
    token: CancellationToken,
) -> JoinHandle<()> {
    indicator.start();
    tokio::spawn(async move {
        tokio::select! {
            _ = done => {}
            () = token.cancelled() => {}
        }
        indicator.stop();
    })
}

async fn feed_stdin(mut pipe: ChildStdin, input: Input) -> Result<(), ProcessError> {
    let fed = match input {
        Input::Bytes(bytes) => pipe.write_all(&bytes).await,
        Input::Reader(reader) => copy_reader(reader, &mut pipe).await,
        Input::File(_) => Ok(()),
    };
    match fed {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Process closed stdin after accepting part of the input");
            Ok(())
        }
        other => other.map_err(ProcessError::Stdin),
    }
}

/// Copy a blocking reader to the child's stdin chunk by chunk.
///
/// Reads happen on a dedicated thread, which may stay blocked inside `read`;
/// it gives up the reader as soon as a read returns and nobody is listening.
async fn copy_reader(reader: SharedReader, pipe: &mut ChildStdin) -> io::Result<()> {
    let (tx, mut rx) = mpsc::channel::<io::Result<Vec<u8>>>(STDIN_CHUNKS_IN_FLIGHT);
    std::thread::Builder::new()
        .name("scripting-stdin".to_string())
        .spawn(move || {
            let Some(mut reader) = reader.try_lock() else {
                let _ = tx.blocking_send(Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "stdin reader is still in use by another run",
                )));
                return;
            };
            let mut chunk = vec![0u8; CHUNK_SIZE];
            loop {
                let read = match reader.read(&mut chunk) {
                    Ok(0) => return,
                    Ok(n) => Ok(chunk[..n].to_vec()),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => Err(e),
                };
                let failed = read.is_err();
                if tx.blocking_send(read).is_err() || failed {
                    return;
                }
            }
        })?;

    while let Some(chunk) = rx.recv().await {
        pipe.write_all(&chunk?).await?;
    }
    Ok(())
}

/// Read stdout and stderr into `output` in the order the chunks arrive.
async fn capture(
    mut stdout: Option<ChildStdout>,
    mut stderr: Option<ChildStderr>,
    output: Option<&mut Vec<u8>>,
) -> io::Result<()> {
    let Some(output) = output else {
        return Ok(());
    };
    let mut out_chunk = [0u8; CHUNK_SIZE];
    let mut err_chunk = [0u8; CHUNK_SIZE];
    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_chunk), if stdout.is_some() => {
                match read? {
                    0 => stdout = None,
                    n => output.extend_from_slice(&out_chunk[..n]),
                }
            }
            read = read_chunk(&mut stderr, &mut err_chunk), if stderr.is_some() => {
                match read? {
                    0 => stderr = None,
                    n => output.extend_from_slice(&err_chunk[..n]),
                }
            }
        }
    }
    Ok(())
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Calls {
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    struct Recording(Arc<Calls>);

    impl ProgressIndicator for Recording {
        fn start(&mut self) {
            self.0.started.fetch_add(1, Ordering::SeqCst);
        }
        fn stop(&mut self) {
            self.0.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn recording(cmd: &mut Command) -> Arc<Calls> {
        let calls = Arc::new(Calls::default());
        let shared = Arc::clone(&calls);
        cmd.progress_with(move || Recording(Arc::clone(&shared)));
        calls
    }

    #[tokio::test]
    async fn test_snapshot_ignores_later_changes() {
        let mut cmd = Command::new("printf");
        cmd.arg("one").capture_stdout(true);
        let snapshot = Execution::from(&cmd);
        cmd.arg("two").sed("o", "0");

        let result = snapshot.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.output_string(), "one");
    }

    #[tokio::test]
    async fn test_progress_stopped_once_after_success() {
        let mut cmd = Command::new("true");
        let calls = recording(&mut cmd);
        cmd.run(None).await.unwrap();
        assert_eq!(calls.started.load(Ordering::SeqCst), 1);
        assert_eq!(calls.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_stopped_once_after_bailed_failure() {
        let mut cmd = Command::new("false");
        let calls = recording(&mut cmd);
        assert!(cmd.run(None).await.is_err());
        assert_eq!(calls.started.load(Ordering::SeqCst), 1);
        assert_eq!(calls.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_kills_process_and_stops_progress() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let calls = recording(&mut cmd);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = cmd.run(Some(&token)).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            err,
            CommandError::Process {
                source: ProcessError::Cancelled,
                ..
            }
        ));
        assert_eq!(calls.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_capture_merges_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"])
            .capture_stdout(true)
            .capture_stderr(true);
        let result = cmd.run(None).await.unwrap();
        let text = result.output_string();
        assert!(text.contains("out\n"), "got: {text:?}");
        assert!(text.contains("err\n"), "got: {text:?}");
    }

    #[tokio::test]
    async fn test_stderr_only_capture() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"])
            .capture_stderr(true);
        let result = cmd.run(None).await.unwrap();
        assert_eq!(result.output_string(), "err\n");
    }

    #[tokio::test]
    async fn test_stdin_reader_is_streamed() {
        let mut cmd = Command::new("cat");
        cmd.stdin_reader(std::io::Cursor::new(b"from reader\n".to_vec()))
            .capture_stdout(true);
        let result = cmd.run(None).await.unwrap();
        assert_eq!(result.output_string(), "from reader\n");

        // The reader is drained by the first run.
        let result = cmd.run(None).await.unwrap();
        assert_eq!(result.output_string(), "");
    }

    /// Yields one line, then blocks as if waiting on a slow producer.
    struct LineThenStall {
        sent: bool,
    }

    impl Read for LineThenStall {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                std::thread::sleep(Duration::from_secs(3600));
                return Ok(0);
            }
            self.sent = true;
            let line = b"first\n";
            buf[..line.len()].copy_from_slice(line);
            Ok(line.len())
        }
    }

    #[tokio::test]
    async fn test_stdin_reader_streams_before_eof() {
        let mut cmd = Command::new("head");
        cmd.args(["-n", "1"])
            .capture_stdout(true)
            .stdin_reader(LineThenStall { sent: false });

        let result = tokio::time::timeout(Duration::from_secs(5), cmd.run(None))
            .await
            .expect("head should exit after the first line")
            .unwrap();
        assert_eq!(result.output_string(), "first\n");

        // The stalled reader is still held; a second run must fail fast, not hang.
        let second = tokio::time::timeout(Duration::from_secs(5), cmd.run(None)).await;
        assert!(second.is_ok(), "second run hung on the busy reader");
    }

    #[tokio::test]
    async fn test_missing_stdin_file() {
        let mut cmd = Command::new("cat");
        cmd.stdin_file("/nonexistent/scripting-input");
        let err = cmd.run(None).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Process {
                source: ProcessError::StdinFile { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_program() {
        let err = Command::new("  ").run(None).await.unwrap_err();
        assert!(matches!(err, CommandError::EmptyProgram));
    }
}
