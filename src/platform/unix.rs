use tokio::process::Command;
use tracing::{debug, warn};

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;

use super::{PortOwner, SignalStrength};

/// Return the user's default shell from `$SHELL`, falling back to `sh`.
fn user_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "sh".to_string())
}

pub fn shell_invocation(command: &str) -> (String, Vec<String>) {
    // Login shell (-l) sources the user's profile so node version managers
    // and other PATH customisations are available to npx / npm.
    (
        user_shell(),
        vec!["-l".to_string(), "-c".to_string(), command.to_string()],
    )
}

pub fn configure_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

pub fn signal_pid(pid: u32, group: bool, strength: SignalStrength) -> bool {
    let sig = match strength {
        SignalStrength::Graceful => Signal::SIGTERM,
        SignalStrength::Force => Signal::SIGKILL,
    };
    // 0 and values past i32::MAX would address our own group or every process.
    let Some(raw) = i32::try_from(pid).ok().filter(|p| *p > 0) else {
        warn!(pid, "refusing to signal invalid pid");
        return false;
    };
    let target = Pid::from_raw(raw);
    let result = if group {
        killpg(target, sig)
    } else {
        kill(target, sig)
    };
    match result {
        Ok(()) => {
            debug!(pid, group, signal = %sig, "signal sent");
            true
        }
        Err(nix::errno::Errno::ESRCH) => {
            debug!(pid, group, "process already exited");
            true
        }
        Err(e) if group => {
            // The leader may have left its group (or never made one); retry
            // against the process itself.
            warn!(pid, error = %e, "killpg failed, signalling the process directly");
            matches!(kill(target, sig), Ok(()) | Err(nix::errno::Errno::ESRCH))
        }
        Err(e) => {
            warn!(pid, error = %e, "kill failed");
            false
        }
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => kill(Pid::from_raw(raw), None).is_ok(),
        _ => false,
    }
}

fn process_name(pid: u32) -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(comm) = std::fs::read_to_string(format!("/proc/{}/comm", pid)) {
            let comm = comm.trim();
            if !comm.is_empty() {
                return comm.to_string();
            }
        }
    }
    std::process::Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "comm="])
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Inode of the listening socket bound to `port`, from a /proc/net/tcp{,6} table.
#[cfg(target_os = "linux")]
fn listening_inode(table: &str, port: u16) -> Option<String> {
    const TCP_LISTEN: &str = "0A";
    let port_hex = format!("{:04X}", port);

    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 || fields[3] != TCP_LISTEN {
            continue;
        }
        let local_port = fields[1].rsplit(':').next();
        if local_port == Some(port_hex.as_str()) && fields[9] != "0" {
            return Some(fields[9].to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
pub fn identify_port_owner(port: u16) -> Option<PortOwner> {
    let inode = ["/proc/net/tcp", "/proc/net/tcp6"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .find_map(|table| listening_inode(&table, port))?;
    let needle = format!("socket:[{}]", inode);

    let proc_dir = std::fs::read_dir("/proc").ok()?;
    for entry in proc_dir.flatten() {
        let pid_str = entry.file_name().to_string_lossy().to_string();
        let Ok(pid) = pid_str.parse::<u32>() else {
            continue;
        };
        let Ok(fds) = std::fs::read_dir(format!("/proc/{}/fd", pid)) else {
            continue;
        };
        for fd_entry in fds.flatten() {
            if let Ok(link) = std::fs::read_link(fd_entry.path()) {
                if link.to_string_lossy() == needle {
                    return Some(PortOwner {
                        pid,
                        name: process_name(pid),
                    });
                }
            }
        }
    }

    None
}

#[cfg(not(target_os = "linux"))]
pub fn identify_port_owner(port: u16) -> Option<PortOwner> {
    let output = std::process::Command::new("lsof")
        .args(["-nP", &format!("-iTCP:{}", port), "-sTCP:LISTEN", "-t"])
        .output()
        .ok()?;
    let pid = String::from_utf8_lossy(&output.stdout)
        .lines()
        .find_map(|l| l.trim().parse::<u32>().ok())?;
    Some(PortOwner {
        pid,
        name: process_name(pid),
    })
}
