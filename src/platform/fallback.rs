//! Platforms without POSIX signals or process groups. Signalling reports
//! failure so callers kill the direct child instead; grandchildren may
//! outlive it.

use tokio::process::Command;

use super::{PortOwner, SignalStrength};

pub fn shell_invocation(command: &str) -> (String, Vec<String>) {
    (
        "cmd.exe".to_string(),
        vec!["/C".to_string(), command.to_string()],
    )
}

pub fn configure_process_group(_cmd: &mut Command) {}

pub fn signal_pid(_pid: u32, _group: bool, _strength: SignalStrength) -> bool {
    false
}

pub fn is_process_alive(_pid: u32) -> bool {
    false
}

pub fn identify_port_owner(_port: u16) -> Option<PortOwner> {
    None
}
