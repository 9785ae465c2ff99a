use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_BACKEND_CLI: &str = "npx convex";
pub const DEFAULT_APP_COMMAND: &str = "npm run dev";
pub const DEFAULT_LOG_CAPACITY: usize = 100;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);
pub const DEFAULT_GRAPH_SETTLE: Duration = Duration::from_secs(3);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READY_WARN_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
pub struct CortexConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub deployments: BTreeMap<String, DeploymentConfig>,
    #[serde(default)]
    pub apps: BTreeMap<String, AppConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default = "default_backend_cli")]
    pub backend_cli: String,
}

fn default_backend_cli() -> String {
    DEFAULT_BACKEND_CLI.to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_grace_period() -> String {
    "500ms".to_string()
}

fn default_graph_settle() -> String {
    "3s".to_string()
}

fn default_probe_timeout() -> String {
    "5s".to_string()
}

fn default_ready_warn_after() -> String {
    "60s".to_string()
}

/// Tunables for the dev session. Durations are humantime strings ("500ms",
/// "3s") so they read naturally in TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    #[serde(default = "default_grace_period")]
    pub grace_period: String,
    #[serde(default = "default_graph_settle")]
    pub graph_settle: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: String,
    #[serde(default = "default_ready_warn_after")]
    pub ready_warn_after: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
            grace_period: default_grace_period(),
            graph_settle: default_graph_settle(),
            probe_timeout: default_probe_timeout(),
            ready_warn_after: default_ready_warn_after(),
        }
    }
}

/// Parsed durations for a session. Unparseable strings fall back to the
/// defaults; `validate` reports them separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    pub grace_period: Duration,
    pub graph_settle: Duration,
    pub probe_timeout: Duration,
    pub ready_warn_after: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            graph_settle: DEFAULT_GRAPH_SETTLE,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            ready_warn_after: DEFAULT_READY_WARN_AFTER,
        }
    }
}

impl SessionConfig {
    pub fn timings(&self) -> SessionTimings {
        let parse = |s: &str, fallback: Duration| humantime::parse_duration(s).unwrap_or(fallback);
        SessionTimings {
            grace_period: parse(&self.grace_period, DEFAULT_GRACE_PERIOD),
            graph_settle: parse(&self.graph_settle, DEFAULT_GRAPH_SETTLE),
            probe_timeout: parse(&self.probe_timeout, DEFAULT_PROBE_TIMEOUT),
            ready_warn_after: parse(&self.ready_warn_after, DEFAULT_READY_WARN_AFTER),
        }
    }

    /// (field name, raw value) pairs for every duration field.
    pub fn duration_fields(&self) -> [(&'static str, &str); 4] {
        [
            ("grace_period", self.grace_period.as_str()),
            ("graph_settle", self.graph_settle.as_str()),
            ("probe_timeout", self.probe_timeout.as_str()),
            ("ready_warn_after", self.ready_warn_after.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub local: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub ready_pattern: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub graph: Option<GraphConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GraphConfig {
    pub engine: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl GraphConfig {
    pub fn engine(&self) -> Option<GraphEngine> {
        GraphEngine::parse(&self.engine)
    }
}

fn default_app_command() -> String {
    DEFAULT_APP_COMMAND.to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_app_command")]
    pub command: String,
    pub port: u16,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Deployment this app talks to; informational and validated.
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub ready_pattern: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// GraphEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphEngine {
    Neo4j,
    Memgraph,
}

impl GraphEngine {
    pub const ALL: [GraphEngine; 2] = [GraphEngine::Neo4j, GraphEngine::Memgraph];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neo4j" => Some(GraphEngine::Neo4j),
            "memgraph" => Some(GraphEngine::Memgraph),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GraphEngine::Neo4j => "neo4j",
            GraphEngine::Memgraph => "memgraph",
        }
    }

    /// Fixed container name used by `docker-compose.graph.yml`.
    pub fn container_name(&self) -> String {
        format!("cortex-{}", self.as_str())
    }

    pub fn bolt_port(&self) -> u16 {
        7687
    }

    /// Browser / lab UI port published by the compose file.
    pub fn ui_port(&self) -> u16 {
        match self {
            GraphEngine::Neo4j => 7474,
            GraphEngine::Memgraph => 3000,
        }
    }
}

impl std::fmt::Display for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
