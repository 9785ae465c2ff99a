use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::SplitStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::platform::{self, SignalStrength};

/// Exit code reported when the process could not be spawned at all.
pub const SPAWN_FAILED: i32 = -1;

/// How long to keep draining output after the direct child exits. Detached
/// grandchildren can hold the pipes open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Everything a child process reports back to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Line {
        service: String,
        generation: u64,
        stream: OutputStream,
        text: String,
    },
    Exited {
        service: String,
        generation: u64,
        code: i32,
    },
}

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Run in a fresh process group so signals reach every descendant.
    pub detached_group: bool,
}

/// One spawned OS process. Output and exit are delivered as [`ProcessEvent`]s
/// on the channel given to [`ProcessHandle::spawn`]; the handle itself only
/// signals and observes exit.
#[derive(Debug)]
pub struct ProcessHandle {
    service: String,
    pid: Option<u32>,
    detached_group: bool,
    exit_rx: watch::Receiver<Option<i32>>,
    kill: CancellationToken,
}

impl ProcessHandle {
    /// Spawn `program args...`. Never fails: a spawn error is reported as a
    /// single `Exited { code: SPAWN_FAILED }` event.
    pub fn spawn(
        service: &str,
        generation: u64,
        program: &str,
        args: &[String],
        options: &SpawnOptions,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Self {
        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = CancellationToken::new();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }
        if options.detached_group {
            platform::configure_process_group(&mut cmd);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(service, program, error = %e, "failed to spawn process");
                let _ = exit_tx.send(Some(SPAWN_FAILED));
                let _ = events.send(ProcessEvent::Exited {
                    service: service.to_string(),
                    generation,
                    code: SPAWN_FAILED,
                });
                return Self {
                    service: service.to_string(),
                    pid: None,
                    detached_group: options.detached_group,
                    exit_rx,
                    kill,
                };
            }
        };

        let pid = child.id();
        debug!(service, pid = ?pid, program, "process spawned");

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(forward_lines(
                out,
                OutputStream::Stdout,
                service.to_string(),
                generation,
                events.clone(),
            ))
        });
        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(forward_lines(
                err,
                OutputStream::Stderr,
                service.to_string(),
                generation,
                events.clone(),
            ))
        });

        let svc = service.to_string();
        let kill_requested = kill.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_requested.cancelled() => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => exit_code(status),
                Err(e) => {
                    warn!(service = %svc, error = %e, "wait() failed");
                    SPAWN_FAILED
                }
            };

            for reader in [stdout, stderr].into_iter().flatten() {
                let _ = tokio::time::timeout(DRAIN_TIMEOUT, reader).await;
            }

            debug!(service = %svc, code, "process exited");
            let _ = exit_tx.send(Some(code));
            let _ = events.send(ProcessEvent::Exited {
                service: svc,
                generation,
                code,
            });
        });

        Self {
            service: service.to_string(),
            pid,
            detached_group: options.detached_group,
            exit_rx,
            kill,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn spawn_failed(&self) -> bool {
        self.pid.is_none() && *self.exit_rx.borrow() == Some(SPAWN_FAILED)
    }

    /// Exit code, once the exit has been observed.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_code().is_some()
    }

    /// Signal the process (or its whole group when spawned detached).
    /// Signalling a process that already exited is a no-op.
    pub fn signal(&self, strength: SignalStrength) {
        if self.has_exited() {
            return;
        }
        if let Some(pid) = self.pid {
            if platform::signal_pid(pid, self.detached_group, strength) {
                return;
            }
        }
        debug!(service = %self.service, "falling back to killing the direct child");
        self.kill.cancel();
    }

    /// Wait up to `timeout` for the exit to be observed. Returns the exit code
    /// if it arrived in time.
    pub async fn wait_exit(&self, timeout: Duration) -> Option<i32> {
        let mut rx = self.exit_rx.clone();
        let observed = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(code)) => *code,
            _ => None,
        };
        observed.or_else(|| self.exit_code())
    }
}

/// Split a pipe into lines and forward them in order. Partial lines are held
/// until their newline (or EOF) arrives; invalid UTF-8 is replaced.
async fn forward_lines<R>(
    reader: R,
    stream: OutputStream,
    service: String,
    generation: u64,
    events: mpsc::UnboundedSender<ProcessEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = SplitStream::new(BufReader::new(reader).split(b'\n'));
    while let Some(chunk) = lines.next().await {
        match chunk {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes)
                    .trim_end_matches('\r')
                    .to_string();
                let event = ProcessEvent::Line {
                    service: service.clone(),
                    generation,
                    stream,
                    text,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(service = %service, ?stream, error = %e, "output read error");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(SPAWN_FAILED)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILED)
}
