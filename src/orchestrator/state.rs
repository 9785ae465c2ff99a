use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::model::GraphEngine;
use crate::orchestrator::process::ProcessHandle;
use crate::orchestrator::supervisor::ReadinessPredicate;

// ---------------------------------------------------------------------------
// ServiceKind / ServiceSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceKind {
    Backend { local: bool, url: Option<String> },
    Graph { engine: GraphEngine, deployment: String },
    App { port: u16 },
}

impl ServiceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ServiceKind::Backend { .. } => "backend",
            ServiceKind::Graph { .. } => "graph",
            ServiceKind::App { .. } => "app",
        }
    }

    /// Where the user reaches the service once it is up.
    pub fn url(&self) -> Option<String> {
        match self {
            ServiceKind::Backend { url, .. } => url.clone(),
            ServiceKind::Graph { engine, .. } => {
                Some(format!("bolt://localhost:{}", engine.bolt_port()))
            }
            ServiceKind::App { port } => Some(format!("http://localhost:{}", port)),
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            ServiceKind::Backend { url, .. } => url
                .as_deref()
                .and_then(crate::config::validate::url_port),
            ServiceKind::Graph { engine, .. } => Some(engine.bolt_port()),
            ServiceKind::App { port } => Some(*port),
        }
    }
}

/// Everything needed to (re)start one service. Produced by the
/// configuration layer, never mutated by the session.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub kind: ServiceKind,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub readiness: ReadinessPredicate,
}

impl ServiceSpec {
    /// Human-readable command line. Shell-wrapped commands show just the
    /// wrapped command.
    pub fn command_line(&self) -> String {
        match self.args.iter().position(|a| a == "-c" || a == "/C") {
            Some(i) if i + 2 == self.args.len() => self.args[i + 1].clone(),
            _ => std::iter::once(self.program.as_str())
                .chain(self.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceRecord
// ---------------------------------------------------------------------------

/// Live state of one supervised service.
///
/// Invariants: `ready` implies `running`; `handle` is set iff `running`.
#[derive(Debug)]
pub struct ServiceRecord {
    pub spec: ServiceSpec,
    pub handle: Option<ProcessHandle>,
    pub running: bool,
    pub ready: bool,
    /// Bumped on every start; events carrying an older value are stale.
    pub generation: u64,
    pub started_at: Option<Instant>,
    pub last_exit: Option<i32>,
    pub ready_warned: bool,
    /// Graph records only: a container start was attempted and no stop has
    /// succeeded since. Independent of `running`, which tracks the log
    /// follower.
    pub container_up: bool,
}

impl ServiceRecord {
    pub fn new(spec: ServiceSpec) -> Self {
        Self {
            spec,
            handle: None,
            running: false,
            ready: false,
            generation: 0,
            started_at: None,
            last_exit: None,
            ready_warned: false,
            container_up: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn kind(&self) -> &ServiceKind {
        &self.spec.kind
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(ProcessHandle::pid)
    }

    pub fn mark_stopped(&mut self) {
        self.handle = None;
        self.running = false;
        self.ready = false;
        self.started_at = None;
    }

    pub fn invariants_hold(&self) -> bool {
        (!self.ready || self.running) && (self.handle.is_some() == self.running)
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot: persisted view of a running session
// ---------------------------------------------------------------------------

pub const SNAPSHOT_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub project: String,
    /// PID of the orchestrator process that owns the session.
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub kind: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub url: Option<String>,
    /// Graph services: container name and the directory holding its
    /// compose file.
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    pub running: bool,
    pub ready: bool,
}

impl SessionSnapshot {
    pub fn capture(project: &str, started_at: DateTime<Utc>, records: &[ServiceRecord]) -> Self {
        let services = records
            .iter()
            .map(|r| {
                let container = match r.kind() {
                    ServiceKind::Graph { engine, .. } => Some(engine.container_name()),
                    _ => None,
                };
                (
                    r.name().to_string(),
                    ServiceSnapshot {
                        kind: r.kind().label().to_string(),
                        pid: r.pid(),
                        port: r.kind().port(),
                        url: r.kind().url(),
                        container,
                        working_dir: Some(r.spec.working_dir.to_string_lossy().to_string()),
                        running: r.running,
                        ready: r.ready,
                    },
                )
            })
            .collect();

        Self {
            project: project.to_string(),
            pid: std::process::id(),
            started_at,
            services,
        }
    }

    pub fn save(&self, state_dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join(SNAPSHOT_FILE);
        let content = serde_json::to_string_pretty(self)?;
        // Atomic write: write to tmp file then rename
        let tmp_path = state_dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub fn load(state_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(state_dir.join(SNAPSHOT_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn remove(state_dir: &Path) -> anyhow::Result<()> {
        let path = state_dir.join(SNAPSHOT_FILE);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}
