use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::bail;
use regex::Regex;
use tracing::warn;

use crate::config::model::{CortexConfig, DeploymentConfig};
use crate::config::validate::find_closest_match;
use crate::orchestrator::state::{ServiceKind, ServiceSpec};
use crate::orchestrator::supervisor::ReadinessPredicate;
use crate::platform;

/// Which configured services a session should run.
#[derive(Debug, Clone)]
pub struct ServiceFilter {
    /// Deployment or app names. Empty selects everything enabled.
    pub names: Vec<String>,
    pub include_apps: bool,
    pub include_graph: bool,
}

impl Default for ServiceFilter {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            include_apps: true,
            include_graph: true,
        }
    }
}

/// Services to start, in start order, plus the names skipped because their
/// working directory is missing.
#[derive(Debug, Default)]
pub struct ResolvedServices {
    pub specs: Vec<ServiceSpec>,
    pub skipped: Vec<String>,
}

/// Suffix appended to a deployment name for its graph service.
pub const GRAPH_SUFFIX: &str = ":graph";

pub fn graph_service_name(deployment: &str) -> String {
    format!("{}{}", deployment, GRAPH_SUFFIX)
}

/// Resolve the enabled services from the config. Per deployment the graph
/// follower comes first, then the backend; apps follow all deployments.
pub fn list_enabled_services(
    config: &CortexConfig,
    base_dir: &Path,
    filter: &ServiceFilter,
) -> anyhow::Result<ResolvedServices> {
    check_names(config, &filter.names)?;

    let selected = |name: &str| filter.names.is_empty() || filter.names.iter().any(|n| n == name);
    let mut resolved = ResolvedServices::default();

    for (name, deployment) in &config.deployments {
        if !deployment.enabled || !selected(name) {
            continue;
        }
        let dir = working_dir(base_dir, deployment.path.as_deref());
        if !dir.is_dir() {
            warn!(service = %name, dir = %dir.display(), "working directory not found, skipping");
            resolved.skipped.push(name.clone());
            continue;
        }

        if filter.include_graph {
            if let Some(spec) = graph_spec(name, deployment, &dir) {
                resolved.specs.push(spec);
            }
        }
        resolved
            .specs
            .push(backend_spec(&config.project.backend_cli, name, deployment, dir));
    }

    if filter.include_apps {
        for (name, app) in &config.apps {
            if !app.enabled {
                continue;
            }
            let wanted = selected(name)
                || app
                    .deployment
                    .as_deref()
                    .is_some_and(|d| !filter.names.is_empty() && selected(d));
            if !wanted {
                continue;
            }
            let dir = working_dir(base_dir, app.path.as_deref());
            if !dir.is_dir() {
                warn!(service = %name, dir = %dir.display(), "working directory not found, skipping");
                resolved.skipped.push(name.clone());
                continue;
            }

            let (program, args) = platform::shell_invocation(&app.command);
            let mut env = app.env.clone();
            env.insert("PORT".to_string(), app.port.to_string());
            resolved.specs.push(ServiceSpec {
                name: name.clone(),
                kind: ServiceKind::App { port: app.port },
                program,
                args,
                working_dir: dir,
                env,
                readiness: readiness_override(app.ready_pattern.as_deref())
                    .unwrap_or_else(ReadinessPredicate::app_default),
            });
        }
    }

    Ok(resolved)
}

fn check_names(config: &CortexConfig, names: &[String]) -> anyhow::Result<()> {
    let known: Vec<String> = config
        .deployments
        .keys()
        .chain(config.apps.keys())
        .cloned()
        .collect();
    for name in names {
        if known.contains(name) {
            continue;
        }
        match find_closest_match(name, &known) {
            Some(suggestion) => bail!(
                "unknown deployment or app '{}' (did you mean '{}'?)",
                name,
                suggestion
            ),
            None => bail!(
                "unknown deployment or app '{}' (known: {})",
                name,
                known.join(", ")
            ),
        }
    }
    Ok(())
}

/// Directory a service runs in; relative paths resolve against the config
/// file's directory.
pub fn working_dir(base_dir: &Path, path: Option<&str>) -> PathBuf {
    match path {
        Some(p) => base_dir.join(platform::expand_home(p)),
        None => base_dir.to_path_buf(),
    }
}

fn readiness_override(pattern: Option<&str>) -> Option<ReadinessPredicate> {
    // Invalid patterns are rejected by validation; ignore them here.
    pattern
        .and_then(|p| Regex::new(p).ok())
        .map(ReadinessPredicate::pattern)
}

fn backend_spec(
    backend_cli: &str,
    name: &str,
    deployment: &DeploymentConfig,
    dir: PathBuf,
) -> ServiceSpec {
    let mut command = format!("{} dev", backend_cli.trim());
    if deployment.local {
        command.push_str(" --local");
    }
    let (program, args) = platform::shell_invocation(&command);
    ServiceSpec {
        name: name.to_string(),
        kind: ServiceKind::Backend {
            local: deployment.local,
            url: deployment.url.clone(),
        },
        program,
        args,
        working_dir: dir,
        env: deployment.env.clone(),
        readiness: readiness_override(deployment.ready_pattern.as_deref())
            .unwrap_or_else(ReadinessPredicate::backend_default),
    }
}

fn graph_spec(name: &str, deployment: &DeploymentConfig, dir: &Path) -> Option<ServiceSpec> {
    let graph = deployment.graph.as_ref().filter(|g| g.enabled)?;
    let engine = graph.engine()?;
    Some(ServiceSpec {
        name: graph_service_name(name),
        kind: ServiceKind::Graph {
            engine,
            deployment: name.to_string(),
        },
        program: "docker".to_string(),
        args: vec![
            "logs".to_string(),
            "-f".to_string(),
            "--tail".to_string(),
            "0".to_string(),
            engine.container_name(),
        ],
        working_dir: dir.to_path_buf(),
        env: BTreeMap::new(),
        readiness: ReadinessPredicate::never(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::GraphEngine;
    use crate::orchestrator::process::OutputStream;

    const CONFIG: &str = r#"
[project]
name = "demo"

[deployments.local]
path = "backend"
url = "http://127.0.0.1:3210"
local = true

[deployments.local.graph]
engine = "neo4j"

[deployments.cloud]
path = "backend"
ready_pattern = "pushed"

[deployments.off]
path = "backend"
enabled = false

[apps.web]
path = "web"
port = 3000
deployment = "local"

[apps.docs]
path = "docs"
port = 3001
"#;

    fn setup() -> (tempfile::TempDir, CortexConfig) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("backend")).unwrap();
        std::fs::create_dir(tmp.path().join("web")).unwrap();
        (tmp, toml::from_str(CONFIG).unwrap())
    }

    fn names(resolved: &ResolvedServices) -> Vec<&str> {
        resolved.specs.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn graph_then_backend_then_apps() {
        let (tmp, config) = setup();
        let resolved = list_enabled_services(&config, tmp.path(), &ServiceFilter::default()).unwrap();
        assert_eq!(names(&resolved), vec!["cloud", "local:graph", "local", "web"]);
        assert_eq!(resolved.skipped, vec!["docs".to_string()]);
    }

    #[test]
    fn backend_command_and_readiness() {
        let (tmp, config) = setup();
        let resolved = list_enabled_services(&config, tmp.path(), &ServiceFilter::default()).unwrap();

        let local = resolved.specs.iter().find(|s| s.name == "local").unwrap();
        assert_eq!(local.command_line(), "npx convex dev --local");
        assert_eq!(local.working_dir, tmp.path().join("backend"));
        assert!(local
            .readiness
            .matches(OutputStream::Stderr, "Convex functions ready!"));

        let cloud = resolved.specs.iter().find(|s| s.name == "cloud").unwrap();
        assert_eq!(cloud.command_line(), "npx convex dev");
        assert!(cloud.readiness.matches(OutputStream::Stdout, "functions pushed"));
    }

    #[test]
    fn graph_follows_container_logs() {
        let (tmp, config) = setup();
        let resolved = list_enabled_services(&config, tmp.path(), &ServiceFilter::default()).unwrap();
        let graph = resolved.specs.iter().find(|s| s.name == "local:graph").unwrap();
        assert_eq!(graph.program, "docker");
        assert_eq!(graph.args.last().map(String::as_str), Some("cortex-neo4j"));
        assert!(matches!(
            graph.kind,
            ServiceKind::Graph { engine: GraphEngine::Neo4j, .. }
        ));
    }

    #[test]
    fn apps_get_port_in_env() {
        let (tmp, config) = setup();
        let resolved = list_enabled_services(&config, tmp.path(), &ServiceFilter::default()).unwrap();
        let web = resolved.specs.iter().find(|s| s.name == "web").unwrap();
        assert_eq!(web.env.get("PORT").map(String::as_str), Some("3000"));
        assert_eq!(web.command_line(), "npm run dev");
    }

    #[test]
    fn filter_by_deployment_pulls_in_its_apps() {
        let (tmp, config) = setup();
        let filter = ServiceFilter {
            names: vec!["local".to_string()],
            ..ServiceFilter::default()
        };
        let resolved = list_enabled_services(&config, tmp.path(), &filter).unwrap();
        assert_eq!(names(&resolved), vec!["local:graph", "local", "web"]);
    }

    #[test]
    fn no_graph_no_apps() {
        let (tmp, config) = setup();
        let filter = ServiceFilter {
            names: vec![],
            include_apps: false,
            include_graph: false,
        };
        let resolved = list_enabled_services(&config, tmp.path(), &filter).unwrap();
        assert_eq!(names(&resolved), vec!["cloud", "local"]);
    }

    #[test]
    fn unknown_name_suggests_closest() {
        let (tmp, config) = setup();
        let filter = ServiceFilter {
            names: vec!["locl".to_string()],
            ..ServiceFilter::default()
        };
        let err = list_enabled_services(&config, tmp.path(), &filter).unwrap_err();
        assert!(err.to_string().contains("did you mean 'local'"), "{}", err);
    }
}
