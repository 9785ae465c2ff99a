use tokio::process::Command;

#[cfg(not(unix))]
mod fallback;
#[cfg(unix)]
mod unix;

#[cfg(not(unix))]
use fallback as imp;
#[cfg(unix)]
use unix as imp;

/// How hard to ask a process to go away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStrength {
    /// SIGTERM, followed by a grace window.
    Graceful,
    /// SIGKILL, no waiting.
    Force,
}

/// The process listening on a TCP port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOwner {
    pub pid: u32,
    pub name: String,
}

/// Program and arguments that run `command` through the user's shell.
/// Unix: `$SHELL -l -c <command>`, elsewhere: `cmd.exe /C <command>`
pub fn shell_invocation(command: &str) -> (String, Vec<String>) {
    imp::shell_invocation(command)
}

/// Configure the command to run in a new process group.
/// Unix: `process_group(0)`; a no-op where process groups are unavailable.
pub fn configure_process_group(cmd: &mut Command) {
    imp::configure_process_group(cmd)
}

/// Whether `signal_pid` can reach a whole process group on this platform.
pub fn supports_process_groups() -> bool {
    cfg!(unix)
}

/// Send a signal to `pid`, or to its process group when `group` is set.
///
/// Returns `true` when the signal was delivered or the target was already
/// gone. Where signals are unsupported this returns `false` and callers fall
/// back to killing the direct child.
pub fn signal_pid(pid: u32, group: bool, strength: SignalStrength) -> bool {
    imp::signal_pid(pid, group, strength)
}

/// Check if a process with the given PID is still alive.
pub fn is_process_alive(pid: u32) -> bool {
    imp::is_process_alive(pid)
}

/// Identify which process is listening on a given TCP port.
pub fn identify_port_owner(port: u16) -> Option<PortOwner> {
    imp::identify_port_owner(port)
}

/// Expand leading `~` or `$HOME` in a path string to the actual home directory.
///
/// Returns the original string unchanged when no home directory is available
/// or the string doesn't start with `~` or `$HOME`.
pub fn expand_home(path: &str) -> String {
    if let Some(home) = dirs::home_dir() {
        let home = home.to_string_lossy();
        if path == "~" || path == "$HOME" {
            return home.to_string();
        }
        if let Some(rest) = path.strip_prefix("~/") {
            return format!("{}/{}", home, rest);
        }
        if let Some(rest) = path.strip_prefix("$HOME/") {
            return format!("{}/{}", home, rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_tilde_slash() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_home("~/code/backend"),
            format!("{}/code/backend", home.to_string_lossy())
        );
    }

    #[test]
    fn expand_home_no_expansion_needed() {
        assert_eq!(expand_home("/usr/bin/cmd"), "/usr/bin/cmd");
        assert_eq!(expand_home("relative/path"), "relative/path");
        assert_eq!(expand_home("/some/~path"), "/some/~path");
    }

    #[test]
    fn shell_invocation_wraps_command() {
        let (_program, args) = shell_invocation("npm run dev");
        assert_eq!(args.last().map(String::as_str), Some("npm run dev"));
    }

    #[cfg(unix)]
    #[test]
    fn signalling_a_dead_pid_counts_as_delivered() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(signal_pid(pid, false, SignalStrength::Graceful));
        assert!(!is_process_alive(pid));
    }

    #[cfg(unix)]
    #[test]
    fn own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }
}
