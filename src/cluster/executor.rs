use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

use crate::cluster::{LAUNCH_FAILURE_EXIT_CODE, SIGNAL_EXIT_CODE, TIMEOUT_EXIT_CODE};
use crate::config::ExecutorConfig;
use crate::security::ApprovedCommand;

const READ_CHUNK: usize = 8192;

/// Why a command produced no regular exit status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFault {
    #[error("command exceeded the time limit of {}s and was killed", .limit.as_secs_f64())]
    Timeout { limit: Duration },

    #[error("failed to launch '{program}': {reason}")]
    Launch { program: String, reason: String },
}

/// Bounded result of running an approved command
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub truncated: bool,
    /// Combined stdout+stderr byte cap that applied to this run
    pub output_limit: usize,
    pub fault: Option<ExecutionFault>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.fault.is_none() && self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.fault, Some(ExecutionFault::Timeout { .. }))
    }

    fn faulted(
        command: &ApprovedCommand,
        output_limit: usize,
        exit_code: i32,
        fault: ExecutionFault,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.command().to_string(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
            truncated: false,
            output_limit,
            fault: Some(fault),
            elapsed,
        }
    }
}

/// Runs approved commands by argument vector, never through a shell
#[derive(Debug, Clone)]
pub struct ClusterExecutor {
    timeout: Duration,
    max_output_bytes: usize,
}

impl ClusterExecutor {
    pub fn new(timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(
            Duration::from_secs(config.timeout_seconds),
            config.max_output_bytes,
        )
    }

    /// Execute an approved command.
    ///
    /// Faults are reported inside the result, never as an error. The child is
    /// spawned with `kill_on_drop`, so dropping this future (caller went away)
    /// kills the process as well.
    pub async fn execute(&self, command: &ApprovedCommand) -> ExecutionResult {
        let started = Instant::now();

        let spawned = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(program = command.program(), error = %e, "failed to launch command");
                return ExecutionResult::faulted(
                    command,
                    self.max_output_bytes,
                    LAUNCH_FAILURE_EXIT_CODE,
                    ExecutionFault::Launch {
                        program: command.program().to_string(),
                        reason: e.to_string(),
                    },
                    started.elapsed(),
                );
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.max_output_bytes;

        let run = async {
            let (out, err) = tokio::join!(read_capped(stdout, cap), read_capped(stderr, cap));
            let status = child.wait().await;
            (out, err, status)
        };
        let outcome = timeout(self.timeout, run).await;

        let (out, err, status) = match outcome {
            Ok(collected) => collected,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill timed out command");
                }
                tracing::warn!(command = command.command(), limit = ?self.timeout, "command timed out");
                return ExecutionResult::faulted(
                    command,
                    cap,
                    TIMEOUT_EXIT_CODE,
                    ExecutionFault::Timeout {
                        limit: self.timeout,
                    },
                    started.elapsed(),
                );
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                return ExecutionResult::faulted(
                    command,
                    cap,
                    LAUNCH_FAILURE_EXIT_CODE,
                    ExecutionFault::Launch {
                        program: command.program().to_string(),
                        reason: e.to_string(),
                    },
                    started.elapsed(),
                );
            }
        };

        let ((stdout, stderr), mut truncated) = apply_combined_cap(out, err, cap);
        let (stdout, out_cut) = decode_bounded(&stdout, cap);
        let (stderr, err_cut) = decode_bounded(&stderr, cap - stdout.len());
        truncated |= out_cut || err_cut;
        let exit_code = status.code().unwrap_or(SIGNAL_EXIT_CODE);

        tracing::debug!(
            command = command.command(),
            exit_code,
            truncated,
            "command finished"
        );

        ExecutionResult {
            command: command.command().to_string(),
            stdout,
            stderr,
            exit_code,
            truncated,
            output_limit: cap,
            fault: None,
            elapsed: started.elapsed(),
        }
    }
}

/// Read a stream to EOF, keeping at most `cap` bytes.
///
/// The rest is drained and discarded so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> (Vec<u8>, bool) {
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };

    let mut kept = Vec::new();
    let mut overflowed = false;
    let mut buf = [0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(kept.len());
                if n > room {
                    overflowed = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read command output");
                break;
            }
        }
    }

    (kept, overflowed)
}

/// Stdout keeps priority; stderr gets whatever room is left
fn apply_combined_cap(
    (mut out, out_overflow): (Vec<u8>, bool),
    (mut err, err_overflow): (Vec<u8>, bool),
    cap: usize,
) -> ((Vec<u8>, Vec<u8>), bool) {
    let truncated = out_overflow || err_overflow || out.len() + err.len() > cap;

    out.truncate(cap);
    err.truncate(cap - out.len());

    ((out, err), truncated)
}

/// Lossy UTF-8 decode that stays within `budget` bytes.
///
/// A character split by the byte cap decodes to U+FFFD, which is wider than
/// the bytes it replaces, so the text is cut back to a char boundary.
fn decode_bounded(bytes: &[u8], budget: usize) -> (String, bool) {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.len() <= budget {
        return (text, false);
    }

    let mut end = budget;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    (text, true)
}
