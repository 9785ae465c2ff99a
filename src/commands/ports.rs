use anyhow::Result;
use is_terminal::IsTerminal;
use std::io::{BufRead, Write};

use crate::orchestrator::ports::{self, PortInstance, COMMON_PORTS};
use crate::platform::SignalStrength;

/// How many times to poll a port after killing its owner.
const RELEASE_ATTEMPTS: usize = 15;

pub async fn run(kill: bool, only: Vec<u16>, all: bool, force: bool) -> Result<()> {
    let scan: Vec<u16> = if only.is_empty() {
        COMMON_PORTS.to_vec()
    } else {
        only
    };

    let found = ports::scan_ports(&scan);
    if found.is_empty() {
        println!("No processes listening on ports {}.", join_ports(&scan));
        return Ok(());
    }

    for (i, inst) in found.iter().enumerate() {
        println!("  {}) {}", i + 1, inst);
    }

    if !kill {
        println!();
        println!("Run `cortex ports --kill` to stop them.");
        return Ok(());
    }

    let targets: Vec<PortInstance> = if all {
        found
    } else if std::io::stdin().is_terminal() {
        found.into_iter().filter(confirm).collect()
    } else {
        anyhow::bail!("stdin is not a terminal; pass --all to kill without confirmation");
    };

    let strength = if force {
        SignalStrength::Force
    } else {
        SignalStrength::Graceful
    };
    let killed = ports::kill_instances(&targets, strength)
        .into_iter()
        .filter(|(_, delivered)| *delivered)
        .count();

    for inst in &targets {
        match ports::wait_port_released(inst.port, RELEASE_ATTEMPTS).await {
            Ok(()) => println!("  freed :{}", inst.port),
            Err(_) => println!("  :{} is still in use (try --force)", inst.port),
        }
    }
    println!("Signalled {} of {} process(es).", killed, targets.len());
    Ok(())
}

fn confirm(inst: &PortInstance) -> bool {
    print!("  kill {}? [y/N] ", inst);
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
