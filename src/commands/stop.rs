use anyhow::{bail, Result};
use backon::{ConstantBuilder, Retryable};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::model::{GraphEngine, SessionTimings};
use crate::config::resolve::{resolve_config, state_dir_for};
use crate::orchestrator::graph::{GraphContainer, SystemRunner};
use crate::orchestrator::state::SessionSnapshot;
use crate::platform::{self, SignalStrength};

/// Stop the session recorded in the project's snapshot.
///
/// A live orchestrator is asked to shut down itself first. Whatever is left
/// afterwards (or everything, when the orchestrator is gone) is signalled
/// directly.
pub async fn run(config_file: Option<&Path>, force: bool) -> Result<()> {
    let config_path = resolve_config(config_file)?;
    let state_dir = state_dir_for(&config_path);

    let Some(snapshot) = SessionSnapshot::load(&state_dir) else {
        println!("No running session found.");
        return Ok(());
    };

    let strength = if force {
        SignalStrength::Force
    } else {
        SignalStrength::Graceful
    };

    if snapshot.pid != std::process::id() && platform::is_process_alive(snapshot.pid) {
        platform::signal_pid(snapshot.pid, false, strength);
        if !force && wait_for_exit(snapshot.pid).await.is_ok() {
            // The orchestrator stopped its services and removed the snapshot.
            if SessionSnapshot::load(&state_dir).is_none() {
                println!("Stopped session for '{}'.", snapshot.project);
                return Ok(());
            }
        }
    }

    stop_leftovers(&snapshot, strength).await;
    SessionSnapshot::remove(&state_dir)?;
    println!("Stopped session for '{}'.", snapshot.project);
    Ok(())
}

async fn wait_for_exit(pid: u32) -> Result<()> {
    (|| async {
        if platform::is_process_alive(pid) {
            bail!("orchestrator {} still running", pid)
        }
        Ok(())
    })
    .retry(
        ConstantBuilder::default()
            .with_delay(Duration::from_millis(250))
            .with_max_times(40),
    )
    .notify(|err: &anyhow::Error, dur: Duration| {
        debug!("{}, retrying in {:?}", err, dur);
    })
    .await
}

async fn stop_leftovers(snapshot: &SessionSnapshot, strength: SignalStrength) {
    let timings = SessionTimings::default();
    for (name, svc) in &snapshot.services {
        if let Some(pid) = svc.pid {
            if platform::is_process_alive(pid) {
                debug!(service = %name, pid, "signalling leftover process group");
                platform::signal_pid(pid, true, strength);
            }
        }

        let engine = svc
            .container
            .as_deref()
            .and_then(|c| c.strip_prefix("cortex-"))
            .and_then(GraphEngine::parse);
        if let Some(engine) = engine {
            let dir = svc
                .working_dir
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let container = GraphContainer::new(
                engine,
                dir,
                Arc::new(SystemRunner),
                timings.probe_timeout,
                timings.graph_settle,
            );
            if !container.stop().await {
                warn!(service = %name, "graph container was not stopped");
            }
        }
    }
}
