//! Runs the external tool and streams its output
//!
//! `execute` blocks for the whole run, which can take hours, so callers run
//! it on a worker thread. stdout and stderr share one pipe, so the caller's
//! callback sees lines in the order the tool wrote them, on the calling thread.

use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::command::ToolLocation;
use crate::constants::runner::{CANCEL_POLL_MS, TERMINATE_GRACE_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Command is empty")]
    EmptyCommand,

    /// The process never started; nothing was processed
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Shared flag that asks a running `execute` to stop the tool
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Underlying flag, for wiring to signal handlers
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// How a started run ended
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    pub status: ExitStatus,
    pub cancelled: bool,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.status.success() && !self.cancelled
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    NotRequested,
    Terminated(Instant),
    Killed,
}

pub struct ProcessRunner {
    working_dir: PathBuf,
    state: RunState,
    cancel: CancelHandle,
}

impl ProcessRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            state: RunState::NotStarted,
            cancel: CancelHandle::new(),
        }
    }

    /// Runner that starts the tool from the directory holding its jar
    pub fn for_tool(location: &ToolLocation) -> Self {
        Self::new(location.working_dir())
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Start `command`, feed every output line to `on_line`, wait for exit.
    ///
    /// stdout and stderr are merged into a single stream. A cancel requested
    /// before this call is discarded; each run starts uncancelled.
    ///
    /// `Err(Launch)` means the process could not be started at all. A process
    /// that started and exited non-zero is `Ok` with a failed outcome.
    pub fn execute(
        &mut self,
        command: &[String],
        mut on_line: impl FnMut(&str),
    ) -> Result<RunOutcome, RunnerError> {
        let (program, args) = command.split_first().ok_or(RunnerError::EmptyCommand)?;
        self.state = RunState::NotStarted;
        self.cancel.reset();

        let launch_error = |source| RunnerError::Launch {
            program: program.clone(),
            source,
        };
        let spawned = merged_output().and_then(|(output, stdout, stderr)| {
            let mut cmd = Command::new(program);
            cmd.args(args)
                .current_dir(&self.working_dir)
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr);
            // the builder holds the write ends; it must be gone before reading
            cmd.spawn().map(|child| (child, output))
        });
        let (mut child, output) = match spawned {
            Ok(spawned) => spawned,
            Err(source) => {
                self.state = RunState::Failed;
                return Err(launch_error(source));
            }
        };
        self.state = RunState::Running;
        info!(pid = child.id(), program = %program, cwd = %self.working_dir.display(), "Started tool");

        let (tx, rx) = mpsc::channel();
        let reader = spawn_reader(output, tx);

        let poll = Duration::from_millis(CANCEL_POLL_MS);
        let mut termination = Termination::NotRequested;
        loop {
            match rx.recv_timeout(poll) {
                Ok(line) => on_line(&line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.enforce_cancel(&mut child, &mut termination);
        }

        // output closed; the process may still be shutting down
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    self.enforce_cancel(&mut child, &mut termination);
                    thread::sleep(poll);
                }
                Err(source) => {
                    self.state = RunState::Failed;
                    return Err(RunnerError::Wait {
                        program: program.clone(),
                        source,
                    });
                }
            }
        };
        let _ = reader.join();

        let outcome = RunOutcome {
            status,
            cancelled: termination != Termination::NotRequested,
        };
        self.state = if outcome.success() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        info!(exit = ?outcome.code(), cancelled = outcome.cancelled, "Tool exited");
        Ok(outcome)
    }

    fn enforce_cancel(&self, child: &mut Child, termination: &mut Termination) {
        if !self.cancel.is_cancelled() {
            return;
        }
        match *termination {
            Termination::NotRequested => {
                info!(pid = child.id(), "Cancelling tool run");
                if let Err(e) = terminate(child) {
                    warn!(error = %e, "Failed to terminate tool");
                }
                *termination = Termination::Terminated(Instant::now());
            }
            Termination::Terminated(at)
                if at.elapsed() >= Duration::from_millis(TERMINATE_GRACE_MS) =>
            {
                warn!(pid = child.id(), "Tool ignored termination, killing");
                if let Err(e) = child.kill() {
                    warn!(error = %e, "Failed to kill tool");
                }
                *termination = Termination::Killed;
            }
            _ => {}
        }
    }
}

/// One pipe for both stdout and stderr: the read end plus two write ends
fn merged_output() -> io::Result<(io::PipeReader, Stdio, Stdio)> {
    let (reader, writer) = io::pipe()?;
    let stderr = writer.try_clone()?;
    Ok((reader, Stdio::from(writer), Stdio::from(stderr)))
}

/// Ask the process to stop, letting the tool run its shutdown hooks
#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(child.id()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Forward lines from the merged stream; non-UTF-8 output is decoded lossily
fn spawn_reader<R: Read + Send + 'static>(stream: R, tx: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read tool output");
                    break;
                }
            }
        }
        debug!("Output stream closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let mut runner = ProcessRunner::new(".");
        assert!(matches!(runner.execute(&[], |_| {}), Err(RunnerError::EmptyCommand)));
        assert_eq!(runner.state(), RunState::NotStarted);
    }

    #[test]
    fn test_launch_failure_is_distinct_from_exit_code() {
        let mut runner = ProcessRunner::new(".");
        let cmd = vec!["/definitely/not/a/runtime".to_string(), "-jar".to_string()];

        let result = runner.execute(&cmd, |_| {});
        assert!(matches!(result, Err(RunnerError::Launch { .. })));
        assert_eq!(runner.state(), RunState::Failed);
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_stdout_and_stderr_lines() {
        let mut runner = ProcessRunner::new(".");
        let mut lines = Vec::new();

        let outcome = runner
            .execute(
                &sh("echo first; echo oops 1>&2; echo second; echo again 1>&2; printf 'last'"),
                |line| lines.push(line.to_string()),
            )
            .unwrap();

        assert!(outcome.success());
        assert_eq!(runner.state(), RunState::Succeeded);
        assert_eq!(lines, vec!["first", "oops", "second", "again", "last"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_is_reported() {
        let mut runner = ProcessRunner::new(".");
        let outcome = runner.execute(&sh("exit 3"), |_| {}).unwrap();

        assert!(!outcome.success());
        assert!(!outcome.cancelled);
        assert_eq!(outcome.code(), Some(3));
        assert_eq!(runner.state(), RunState::Failed);
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new(dir.path());
        let mut lines = Vec::new();

        runner
            .execute(&sh("pwd -P"), |line| lines.push(line.to_string()))
            .unwrap();

        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(lines, vec![expected.display().to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_stops_long_run() {
        let mut runner = ProcessRunner::new(".");
        let cancel = runner.cancel_handle();
        let started = Instant::now();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            cancel.cancel();
        });
        let outcome = runner.execute(&sh("echo started; exec sleep 30"), |_| {}).unwrap();
        canceller.join().unwrap();

        assert!(outcome.cancelled);
        assert!(!outcome.success());
        assert_eq!(runner.state(), RunState::Failed);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancelled_runner_can_run_again() {
        let mut runner = ProcessRunner::new(".");
        let cancel = runner.cancel_handle();

        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                cancel.cancel();
            })
        };
        let first = runner.execute(&sh("exec sleep 30"), |_| {}).unwrap();
        canceller.join().unwrap();
        assert!(first.cancelled);
        assert_eq!(runner.state(), RunState::Failed);

        let mut lines = Vec::new();
        let second = runner
            .execute(&sh("echo hi; sleep 0.3; exit 0"), |line| lines.push(line.to_string()))
            .unwrap();
        assert!(!second.cancelled);
        assert!(second.success());
        assert_eq!(runner.state(), RunState::Succeeded);
        assert_eq!(lines, vec!["hi"]);
        assert!(!cancel.is_cancelled());
    }
}
