use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

use crate::cli::SessionArgs;
use crate::config;
use crate::config::resolve::{resolve_config, state_dir_for};
use crate::config::services::{list_enabled_services, ServiceFilter};
use crate::orchestrator::state::SessionSnapshot;
use crate::orchestrator::{OrchestratorSession, SessionExit, SessionOptions};
use crate::platform;

/// Run a dev session. `interactive` enables keyboard control when stdin is a
/// terminal.
pub async fn run(
    config_file: Option<&Path>,
    args: SessionArgs,
    interactive: bool,
) -> Result<SessionExit> {
    let config_path = resolve_config(config_file)?;
    let config = config::load_validated(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let base_dir = config_path.parent().unwrap_or(Path::new("."));
    let state_dir = state_dir_for(&config_path);

    if let Some(existing) = SessionSnapshot::load(&state_dir) {
        if existing.pid != std::process::id() && platform::is_process_alive(existing.pid) {
            bail!(
                "a session for '{}' is already running (pid {}); run `cortex stop` first",
                existing.project,
                existing.pid
            );
        }
    }

    let filter = ServiceFilter {
        names: args.names,
        include_apps: !args.no_apps,
        include_graph: !args.no_graph,
    };
    let resolved = list_enabled_services(&config, base_dir, &filter)?;
    if resolved.specs.is_empty() {
        if resolved.skipped.is_empty() {
            bail!("no enabled deployments or apps in {}", config_path.display());
        }
        bail!(
            "nothing to run: every selected service was skipped ({})",
            resolved.skipped.join(", ")
        );
    }

    info!(
        project = %config.project.name,
        services = resolved.specs.len(),
        skipped = resolved.skipped.len(),
        "starting session"
    );

    let options = SessionOptions {
        project: config.project.name.clone(),
        interactive,
        quiet: false,
        timings: config.session.timings(),
        log_capacity: config.session.log_capacity,
        state_dir: Some(state_dir),
    };
    OrchestratorSession::new(resolved.specs, options).run().await
}
