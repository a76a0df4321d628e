//! Structured subprocess execution with a hard timeout.
//!
//! Commands are argument vectors, never shell strings. Each child runs in
//! its own process group so a timeout can take down everything it spawned
//! (package managers fork freely) while keeping whatever output was
//! produced before the deadline.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Captured output is cut to its trailing 64 KiB.
pub const MAX_CAPTURED_OUTPUT: usize = 65536;

/// How long to keep draining pipes after the child itself is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The process exited on its own. `code` is -1 when killed by a signal.
    Exited { code: i32, output: String },
    TimedOut { output: String },
    SpawnFailed { message: String },
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        matches!(self, CommandOutcome::Exited { code: 0, .. })
    }

    /// One-line summary plus captured output, for error records.
    pub fn describe(&self, timeout: Duration) -> String {
        match self {
            CommandOutcome::Exited { code, output } => {
                format!("exited with status {code}\n{output}")
            }
            CommandOutcome::TimedOut { output } => {
                format!("timed out after {}s\n{output}", timeout.as_secs())
            }
            CommandOutcome::SpawnFailed { message } => {
                format!("failed to execute command: {message}")
            }
        }
    }
}

/// Run `argv` in `cwd`, capturing combined stdout/stderr.
pub async fn run_command(argv: &[String], cwd: &Path, timeout: Duration) -> CommandOutcome {
    let Some((program, args)) = argv.split_first() else {
        return CommandOutcome::SpawnFailed {
            message: "empty command".to_string(),
        };
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .env("CI", "true")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return CommandOutcome::SpawnFailed {
                message: format!("{program}: {e}"),
            }
        }
    };

    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, captured.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, captured.clone()));
    }

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    let timed_out = waited.is_err();
    if timed_out {
        kill_process_group(&mut child).await;
    }

    for mut reader in readers {
        if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
            reader.abort();
        }
    }

    let output = take_output(&captured);
    match waited {
        Ok(Ok(status)) => CommandOutcome::Exited {
            code: status.code().unwrap_or(-1),
            output,
        },
        Ok(Err(e)) => CommandOutcome::SpawnFailed {
            message: format!("{program}: {e}"),
        },
        Err(_) => CommandOutcome::TimedOut { output },
    }
}

fn spawn_reader<R>(mut pipe: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                        if buf.len() > MAX_CAPTURED_OUTPUT * 2 {
                            let excess = buf.len() - MAX_CAPTURED_OUTPUT;
                            buf.drain(..excess);
                        }
                    }
                }
            }
        }
    })
}

async fn kill_process_group(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: signalling a process group we created; no memory is shared.
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
            }
        }
    }
    let _ = child.kill().await;
}

fn take_output(captured: &Mutex<Vec<u8>>) -> String {
    let bytes = captured.lock().map(|b| b.clone()).unwrap_or_default();
    truncate_output(&bytes)
}

pub fn truncate_output(bytes: &[u8]) -> String {
    if bytes.len() > MAX_CAPTURED_OUTPUT {
        let tail = &bytes[bytes.len() - MAX_CAPTURED_OUTPUT..];
        format!("...truncated...\n{}", String::from_utf8_lossy(tail))
    } else {
        String::from_utf8_lossy(bytes).to_string()
    }
}
