//! Subprocess execution with a wall-clock limit.
//!
//! `CommandRunner` is the seam stages use to launch external tools; tests swap
//! in a fake that never spawns anything.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long stderr may keep arriving after the child is gone. Grandchildren
/// can hold the pipe open long after that.
const STDERR_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to launch {program:?}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting on {program:?}")]
    Wait {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// File the command is expected to produce.
    pub expected_output: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub timed_out: bool,
    pub output_exists: bool,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0) && self.output_exists
    }
}

pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome, CommandError>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome, CommandError> {
        debug!(program = ?spec.program, args = ?spec.args, "spawning");
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        let rx = read_stderr(child.stderr.take());
        let waited = wait_with_timeout(&mut child, spec.timeout);
        let stderr = drain_stderr(&rx, STDERR_GRACE);

        let (exit_code, timed_out) = match waited {
            Ok(Some(code)) => (code, false),
            Ok(None) => {
                warn!(program = ?spec.program, timeout = ?spec.timeout, "timed out; killed");
                (None, true)
            }
            Err(source) => {
                return Err(CommandError::Wait {
                    program: spec.program.clone(),
                    source,
                })
            }
        };

        let output_exists = spec
            .expected_output
            .as_ref()
            .map(|p| p.is_file())
            .unwrap_or(true);

        Ok(CommandOutcome {
            exit_code,
            stderr,
            timed_out,
            output_exists,
        })
    }
}

/// Forward stderr chunks from a helper thread. The sender drops when the pipe
/// closes, or right away without a pipe.
fn read_stderr(pipe: Option<ChildStderr>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
    rx
}

/// Collect stderr until the pipe closes or `grace` runs out, whichever is first.
fn drain_stderr(rx: &Receiver<Vec<u8>>, grace: Duration) -> String {
    let deadline = Instant::now() + grace;
    let mut buf = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                debug!("stderr still open after exit; keeping what arrived");
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// `Ok(Some(code))` on exit, `Ok(None)` after killing a child that overran.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<Option<i32>>> {
    let start = Instant::now();
    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status.code())),
            None if start.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}
