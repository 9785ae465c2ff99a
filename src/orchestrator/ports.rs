use std::fmt;
use std::net::TcpListener;
use std::time::Duration;

use anyhow::bail;
use backon::{ConstantBuilder, Retryable};
use tracing::{debug, info, warn};

use crate::orchestrator::state::{ServiceKind, ServiceSpec};
use crate::platform::{self, PortOwner, SignalStrength};

/// Ports dev servers commonly squat on: web frameworks, the local backend
/// and its dashboard, vite, generic HTTP.
pub const COMMON_PORTS: [u16; 8] = [3000, 3001, 3210, 3211, 5173, 6790, 6791, 8080];

/// A process found listening on one of the scanned ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInstance {
    pub port: u16,
    pub pid: u32,
    pub name: String,
}

impl fmt::Display for PortInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{} {} (pid {})", self.port, self.name, self.pid)
    }
}

pub fn check_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Scan `ports` with an injectable owner lookup, in the order given.
pub fn scan_ports_with<F>(ports: &[u16], owner_of: F) -> Vec<PortInstance>
where
    F: Fn(u16) -> Option<PortOwner>,
{
    ports
        .iter()
        .filter_map(|&port| {
            owner_of(port).map(|owner| PortInstance {
                port,
                pid: owner.pid,
                name: owner.name,
            })
        })
        .collect()
}

pub fn scan_ports(ports: &[u16]) -> Vec<PortInstance> {
    scan_ports_with(ports, platform::identify_port_owner)
}

/// Signal each instance's process. Returns how many signals were delivered.
pub fn kill_instances(
    instances: &[PortInstance],
    strength: SignalStrength,
) -> Vec<(&PortInstance, bool)> {
    instances
        .iter()
        .map(|inst| {
            let delivered = platform::signal_pid(inst.pid, false, strength);
            if delivered {
                info!(port = inst.port, pid = inst.pid, process = %inst.name, "signalled port owner");
            } else {
                warn!(port = inst.port, pid = inst.pid, "could not signal port owner");
            }
            (inst, delivered)
        })
        .collect()
}

/// Poll until `port` can be bound again.
pub async fn wait_port_released(port: u16, attempts: usize) -> anyhow::Result<()> {
    (|| async {
        if check_port_available(port) {
            Ok(())
        } else {
            bail!("port {} still in use", port)
        }
    })
    .retry(
        ConstantBuilder::default()
            .with_delay(Duration::from_millis(200))
            .with_max_times(attempts),
    )
    .notify(|err: &anyhow::Error, dur: Duration| {
        debug!("{}, retrying in {:?}", err, dur);
    })
    .await
}

// ---------------------------------------------------------------------------
// Startup conflicts
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PortConflict {
    pub service: String,
    pub port: u16,
    pub owner: Option<PortOwner>,
}

impl fmt::Display for PortConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(
                f,
                "port {} needed by '{}' is already in use by {} (pid {})",
                self.port, self.service, owner.name, owner.pid
            ),
            None => write!(
                f,
                "port {} needed by '{}' is already in use",
                self.port, self.service
            ),
        }
    }
}

/// App ports that are already bound. The session only warns about these;
/// the `k` menu or `cortex ports --kill` frees them.
pub fn check_app_ports(specs: &[ServiceSpec]) -> Vec<PortConflict> {
    specs
        .iter()
        .filter_map(|spec| match spec.kind {
            ServiceKind::App { port } if !check_port_available(port) => {
                Some(PortConflict {
                    service: spec.name.clone(),
                    port,
                    owner: platform::identify_port_owner(port),
                })
            }
            _ => None,
        })
        .collect()
}
