use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::config::model::GraphEngine;

/// Compose file that defines the graph containers, looked up in the
/// deployment's working directory.
pub const COMPOSE_FILE: &str = "docker-compose.graph.yml";

/// `docker compose up` may pull an image; give it much longer than a probe.
const COMPOSE_UP_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// External command seam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn docker<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: "docker".to_string(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

/// Runs short-lived external commands. Failures (missing binary, timeout)
/// are reported in the output, never as errors.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, cmd: &'a ExternalCommand, timeout: Duration)
        -> BoxFuture<'a, CommandOutput>;
}

/// Runs commands on the host with tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run<'a>(
        &'a self,
        cmd: &'a ExternalCommand,
        timeout: Duration,
    ) -> BoxFuture<'a, CommandOutput> {
        Box::pin(async move {
            let mut command = tokio::process::Command::new(&cmd.program);
            command
                .args(&cmd.args)
                .stdin(Stdio::null())
                .kill_on_drop(true);
            if let Some(dir) = &cmd.cwd {
                command.current_dir(dir);
            }

            match tokio::time::timeout(timeout, command.output()).await {
                Ok(Ok(output)) => CommandOutput {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    timed_out: false,
                },
                Ok(Err(e)) => CommandOutput {
                    stderr: e.to_string(),
                    ..CommandOutput::default()
                },
                Err(_) => {
                    debug!(command = %cmd.display(), ?timeout, "command timed out");
                    CommandOutput {
                        timed_out: true,
                        ..CommandOutput::default()
                    }
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// GraphContainer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Absent,
    Stopped,
    Running,
}

/// Toggles the graph database container for one deployment.
///
/// `start` walks a fallback chain, each step tried once: already running,
/// start the existing container, then remove and recreate it from the
/// compose file. Every probe races `probe_timeout`; a timed-out probe
/// counts as "not found".
pub struct GraphContainer {
    engine: GraphEngine,
    working_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
    probe_timeout: Duration,
    settle: Duration,
}

impl GraphContainer {
    pub fn new(
        engine: GraphEngine,
        working_dir: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        probe_timeout: Duration,
        settle: Duration,
    ) -> Self {
        Self {
            engine,
            working_dir: working_dir.into(),
            runner,
            probe_timeout,
            settle,
        }
    }

    pub fn container_name(&self) -> String {
        self.engine.container_name()
    }

    pub fn compose_file(&self) -> PathBuf {
        self.working_dir.join(COMPOSE_FILE)
    }

    pub async fn state(&self) -> GraphState {
        if self.probe(false).await {
            GraphState::Running
        } else if self.probe(true).await {
            GraphState::Stopped
        } else {
            GraphState::Absent
        }
    }

    /// Bring the container up. Returns `false` without touching docker when
    /// the compose file is missing.
    pub async fn start(&self) -> bool {
        let name = self.container_name();
        if !self.compose_file().is_file() {
            warn!(
                container = %name,
                file = %self.compose_file().display(),
                "graph compose file not found"
            );
            return false;
        }

        if self.probe(false).await {
            debug!(container = %name, "graph container already running");
            return true;
        }

        if self.probe(true).await {
            info!(container = %name, "starting existing graph container");
            let out = self
                .exec(ExternalCommand::docker(["start", name.as_str()]), self.probe_timeout)
                .await;
            if out.success && self.settle_and_verify().await {
                return true;
            }
            warn!(container = %name, "existing container did not come up, recreating");
        }

        self.exec(
            ExternalCommand::docker(["rm", "-f", name.as_str()]),
            self.probe_timeout,
        )
        .await;

        info!(container = %name, "creating graph container from {}", COMPOSE_FILE);
        let up = self
            .exec(
                ExternalCommand::docker(["compose", "-f", COMPOSE_FILE, "up", "-d", self.engine.as_str()])
                    .in_dir(&self.working_dir),
                COMPOSE_UP_TIMEOUT,
            )
            .await;
        if !up.success {
            warn!(container = %name, stderr = %up.stderr.trim(), "docker compose up failed");
            return false;
        }
        self.settle_and_verify().await
    }

    pub async fn stop(&self) -> bool {
        let name = self.container_name();
        let out = self
            .exec(ExternalCommand::docker(["stop", name.as_str()]), self.probe_timeout)
            .await;
        if out.success {
            info!(container = %name, "graph container stopped");
        } else {
            warn!(container = %name, stderr = %out.stderr.trim(), "failed to stop graph container");
        }
        out.success
    }

    async fn settle_and_verify(&self) -> bool {
        // The container reports running before the database accepts
        // connections.
        tokio::time::sleep(self.settle).await;
        self.probe(false).await
    }

    /// Whether the container exists (`all`) or is running.
    async fn probe(&self, all: bool) -> bool {
        let name = self.container_name();
        let filter = format!("name=^{}$", name);
        let mut args = vec!["ps"];
        if all {
            args.push("-a");
        }
        args.extend(["--filter", filter.as_str(), "--format", "{{.Names}}"]);

        let out = self.exec(ExternalCommand::docker(args), self.probe_timeout).await;
        out.success && out.stdout.lines().any(|l| l.trim() == name)
    }

    /// Run one docker command, racing it against `timeout`. A command that
    /// never answers counts as failed.
    async fn exec(&self, cmd: ExternalCommand, timeout: Duration) -> CommandOutput {
        debug!(command = %cmd.display(), "running");
        match tokio::time::timeout(timeout, self.runner.run(&cmd, timeout)).await {
            Ok(out) => out,
            Err(_) => {
                warn!(command = %cmd.display(), ?timeout, "docker command timed out");
                CommandOutput {
                    timed_out: true,
                    ..CommandOutput::default()
                }
            }
        }
    }
}
