//! Running instances of the external tool.

use super::registry::{same_mount_point, MountEntry};
use log::debug;
use sysinfo::{ProcessRefreshKind, RefreshKind, System, UpdateKind};

/// A running process and its command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Full command line, program first
    pub args: Vec<String>,
}

impl ProcessInfo {
    /// Whether this is a mount of exactly `entry`'s remote at `entry`'s
    /// mount point.
    pub fn mounts(&self, entry: &MountEntry) -> bool {
        let args = self.args.get(1..).unwrap_or_default();
        args.iter().any(|a| a == "mount")
            && args.iter().any(|a| a == &entry.remote)
            && args.iter().any(|a| same_mount_point(a, &entry.mount_point))
    }
}

/// Process enumeration and termination.
pub trait ProcessTable {
    /// Running processes whose program name is `name`.
    fn instances(&self, name: &str) -> Vec<ProcessInfo>;

    /// Asks `pid` to exit. Returns whether the request was delivered.
    fn terminate(&self, pid: u32) -> bool;
}

/// The operating system's process table.
#[derive(Debug, Default)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    fn snapshot() -> System {
        System::new_with_specifics(
            RefreshKind::new()
                .with_processes(ProcessRefreshKind::new().with_cmd(UpdateKind::Always)),
        )
    }
}

impl ProcessTable for SystemProcessTable {
    fn instances(&self, name: &str) -> Vec<ProcessInfo> {
        let system = Self::snapshot();
        let mut found: Vec<ProcessInfo> = system
            .processes()
            .iter()
            .filter(|(_, process)| program_matches(&process.name().to_string_lossy(), name))
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                args: process
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect();
        found.sort_by_key(|p| p.pid);
        debug!("Found {} running {} process(es)", found.len(), name);
        found
    }

    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> bool {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid as NixPid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        signal::kill(NixPid::from_raw(raw), Signal::SIGTERM).is_ok()
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: u32) -> bool {
        use sysinfo::Pid;

        let system = Self::snapshot();
        system
            .process(Pid::from_u32(pid))
            .map(|process| process.kill())
            .unwrap_or(false)
    }
}

/// Compares a listed process name with the tool's name, ignoring case and
/// an `.exe` suffix.
pub fn program_matches(process_name: &str, name: &str) -> bool {
    let trimmed = process_name
        .strip_suffix(".exe")
        .or_else(|| process_name.strip_suffix(".EXE"))
        .unwrap_or(process_name);
    trimmed.eq_ignore_ascii_case(name)
}
