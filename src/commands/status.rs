use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::model::{GraphEngine, SessionTimings};
use crate::config::resolve::{resolve_config, state_dir_for};
use crate::orchestrator::graph::{GraphContainer, GraphState, SystemRunner};
use crate::orchestrator::state::{ServiceSnapshot, SessionSnapshot};
use crate::platform;

pub async fn run(config_file: Option<&Path>) -> Result<()> {
    let config_path = resolve_config(config_file)?;
    let state_dir = state_dir_for(&config_path);

    let Some(snapshot) = SessionSnapshot::load(&state_dir) else {
        println!("No running session found.");
        println!("Run `cortex dev` to start one.");
        return Ok(());
    };

    let orchestrator_alive = platform::is_process_alive(snapshot.pid);
    println!(
        "  Project: {} (started {}, pid {})",
        snapshot.project,
        snapshot
            .started_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S"),
        snapshot.pid
    );
    if !orchestrator_alive {
        println!(
            "  {} orchestrator is not running; run `cortex stop` to clean up",
            "!".yellow()
        );
    }
    println!();
    println!("  {:<20} {:<8} {:<8} {:<28} STATUS", "SERVICE", "KIND", "PID", "URL");
    println!("  {}", "-".repeat(76));

    let timings = SessionTimings::default();
    let client = reqwest::Client::builder()
        .timeout(timings.probe_timeout)
        .build()?;

    for (name, svc) in &snapshot.services {
        let status = service_status(svc, &client, timings).await;
        println!(
            "  {:<20} {:<8} {:<8} {:<28} {}",
            name,
            svc.kind,
            svc.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            svc.url.as_deref().unwrap_or("-"),
            status
        );
    }
    println!();
    Ok(())
}

async fn service_status(
    svc: &ServiceSnapshot,
    client: &reqwest::Client,
    timings: SessionTimings,
) -> String {
    if let Some(engine) = svc
        .container
        .as_deref()
        .and_then(|c| c.strip_prefix("cortex-"))
        .and_then(GraphEngine::parse)
    {
        let dir = svc.working_dir.as_deref().unwrap_or(".");
        let container = GraphContainer::new(
            engine,
            dir,
            Arc::new(SystemRunner),
            timings.probe_timeout,
            Duration::ZERO,
        );
        return match container.state().await {
            GraphState::Running => "container running".to_string(),
            GraphState::Stopped => "container stopped".to_string(),
            GraphState::Absent => "container absent".to_string(),
        };
    }

    let alive = svc.pid.is_some_and(platform::is_process_alive);
    if !alive {
        return "stopped".to_string();
    }
    match (svc.kind.as_str(), svc.url.as_deref()) {
        ("backend", Some(url)) => match client.get(url).send().await {
            Ok(_) => "running, reachable".to_string(),
            Err(_) => "running, unreachable".to_string(),
        },
        _ => "running".to_string(),
    }
}
