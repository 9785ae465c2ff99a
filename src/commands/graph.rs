use anyhow::{anyhow, bail, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cli::GraphCommands;
use crate::config;
use crate::config::resolve::resolve_config;
use crate::config::services::working_dir;
use crate::config::validate::find_closest_match;
use crate::orchestrator::graph::{GraphContainer, SystemRunner, COMPOSE_FILE};

pub async fn run(config_file: Option<&Path>, command: GraphCommands) -> Result<()> {
    let config_path = resolve_config(config_file)?;
    let config = config::load_validated(&config_path)?;
    let base_dir = config_path.parent().unwrap_or(Path::new("."));

    let (deployment_name, starting) = match &command {
        GraphCommands::Start { deployment } => (deployment.as_str(), true),
        GraphCommands::Stop { deployment } => (deployment.as_str(), false),
    };

    let deployment = config.deployments.get(deployment_name).ok_or_else(|| {
        let known: Vec<String> = config.deployments.keys().cloned().collect();
        match find_closest_match(deployment_name, &known) {
            Some(s) => anyhow!("unknown deployment '{}' (did you mean '{}'?)", deployment_name, s),
            None => anyhow!("unknown deployment '{}'", deployment_name),
        }
    })?;
    let Some(engine) = deployment.graph.as_ref().and_then(|g| g.engine()) else {
        bail!("deployment '{}' has no graph database configured", deployment_name);
    };

    let timings = config.session.timings();
    let container = GraphContainer::new(
        engine,
        working_dir(base_dir, deployment.path.as_deref()),
        Arc::new(SystemRunner),
        timings.probe_timeout,
        timings.graph_settle,
    );

    if starting {
        if !container.compose_file().is_file() {
            bail!(
                "{} not found in {}",
                COMPOSE_FILE,
                container
                    .compose_file()
                    .parent()
                    .unwrap_or(Path::new("."))
                    .display()
            );
        }
        if !container.start().await {
            bail!("graph container {} did not start", container.container_name());
        }
        println!(
            "{} running (bolt://localhost:{}, UI http://localhost:{})",
            container.container_name(),
            engine.bolt_port(),
            engine.ui_port()
        );
    } else {
        if !container.stop().await {
            bail!("failed to stop {}", container.container_name());
        }
        println!("{} stopped", container.container_name());
    }
    Ok(())
}
