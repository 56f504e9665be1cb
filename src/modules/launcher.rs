//! Launching and stopping mount processes.
//!
//! Mounts are fire-and-forget: the launcher spawns a detached process, writes
//! a mount record and returns. Stopping goes through the recorded pid first
//! and falls back to matching command lines of running tool instances.

use super::config::UnmountScope;
use super::error::{EzMountError, Result};
use super::password::{attach_credentials, Passphrase};
use super::process::{ProcessInfo, ProcessTable};
use super::records::{ExitedMount, MountRecord, MountTracker};
use super::registry::MountEntry;
use super::tool::RcloneTool;
use log::{debug, error, info, warn};
use std::path::Path;
use std::process::{Command, Stdio};

/// Spawns and terminates instances of the external tool.
pub struct Launcher {
    tool: RcloneTool,
    tracker: MountTracker,
    processes: Box<dyn ProcessTable>,
}

impl Launcher {
    /// Creates a launcher.
    ///
    /// # Arguments
    ///
    /// * `tool` - Builds the mount commands
    /// * `tracker` - Stores a record per launched mount
    /// * `processes` - Process table used to find and stop mounts
    pub fn new(tool: RcloneTool, tracker: MountTracker, processes: Box<dyn ProcessTable>) -> Self {
        Self {
            tool,
            tracker,
            processes,
        }
    }

    /// The tool commands are built with.
    pub fn tool(&self) -> &RcloneTool {
        &self.tool
    }

    /// Mount records of this launcher.
    pub fn tracker(&self) -> &MountTracker {
        &self.tracker
    }

    /// Launches a detached mount of `entry` and returns its pid.
    ///
    /// When the passphrase travels through a helper script, this blocks for
    /// the cleanup delay before deleting it.
    ///
    /// # Errors
    ///
    /// [`EzMountError::LaunchFailure`] when the tool cannot be spawned.
    pub fn mount(
        &mut self,
        entry: &MountEntry,
        credentials: &Path,
        log_path: &Path,
        passphrase: &Passphrase,
    ) -> Result<u32> {
        let settings = self.tool.settings().clone();
        let mut cmd = self.tool.mount_command(entry, credentials, log_path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut cmd);
        let helper = attach_credentials(
            &mut cmd,
            settings.credential_channel,
            passphrase,
            &settings.helper_dir(),
        )?;

        info!(
            "Launching mount for {}: {} {}",
            entry.label,
            self.tool.program(),
            self.tool
                .mount_args(entry, credentials, log_path)
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = EzMountError::LaunchFailure {
                    program: self.tool.program(),
                    target: entry.label.clone(),
                    source,
                };
                error!("{}", err);
                return Err(err);
            }
        };

        let pid = child.id();
        if let Err(e) = self.tracker.record(entry, pid, Some(child)) {
            warn!("Mount for {} is running untracked (pid {}): {}", entry.label, pid, e);
        }
        info!("Mount process for {} started (pid {})", entry.label, pid);

        if let Some(helper) = helper {
            helper.remove_after(settings.cleanup_delay());
        }
        Ok(pid)
    }

    /// Stops the mount process of `entry`. Returns whether one was found.
    pub fn unmount_one(&mut self, entry: &MountEntry) -> Result<bool> {
        let instances = self.processes.instances(&self.tool.process_name());

        if let Some(record) = self.tracker.find(entry)? {
            self.tracker.forget(&record);
            let tracked = instances
                .iter()
                .find(|p| p.pid == record.pid && p.mounts(entry));
            match tracked {
                Some(process) if self.processes.terminate(process.pid) => {
                    info!(
                        "Terminated mount process for {} (pid {})",
                        entry.label, process.pid
                    );
                    return Ok(true);
                }
                _ => debug!(
                    "Record for {} points at pid {} which is no longer its mount",
                    entry.label, record.pid
                ),
            }
        }

        let mut terminated = 0;
        for process in instances.iter().filter(|p| p.mounts(entry)) {
            if self.processes.terminate(process.pid) {
                info!(
                    "Terminated mount process for {} (pid {}, matched by arguments)",
                    entry.label, process.pid
                );
                terminated += 1;
            }
        }

        if terminated == 0 {
            info!(
                "{}",
                EzMountError::NoMatchingProcess {
                    label: entry.label.clone()
                }
            );
        }
        Ok(terminated > 0)
    }

    /// Stops every tool process in `scope`. Returns how many were signalled.
    pub fn unmount_all(&mut self, scope: UnmountScope) -> Result<usize> {
        let instances = self.processes.instances(&self.tool.process_name());
        let records = self.tracker.list()?;

        let targets: Vec<&ProcessInfo> = match scope {
            UnmountScope::Global => instances.iter().collect(),
            UnmountScope::Tracked => instances
                .iter()
                .filter(|p| records.iter().any(|r| r.pid == p.pid))
                .collect(),
        };

        let mut terminated = Vec::new();
        for process in targets {
            if self.processes.terminate(process.pid) {
                terminated.push(process.pid);
            } else {
                warn!("Could not terminate {} (pid {})", self.tool.program(), process.pid);
            }
        }

        for record in &records {
            let running = instances.iter().any(|p| p.pid == record.pid);
            if terminated.contains(&record.pid) || !running {
                self.tracker.forget(record);
            }
        }

        info!(
            "Unmount all ({:?}): terminated {} process(es)",
            scope,
            terminated.len()
        );
        Ok(terminated.len())
    }

    /// Whether this session's mount process for `entry` is still running.
    pub fn is_running(&mut self, entry: &MountEntry) -> bool {
        match self.tracker.find(entry) {
            Ok(Some(record)) => self.tracker.child_alive(record.pid),
            _ => false,
        }
    }

    /// Reaps exited mount processes started by this session.
    pub fn reap(&mut self) -> Vec<ExitedMount> {
        let exited = self.tracker.reap();
        for mount in exited.iter().filter(|m| !m.success) {
            warn!(
                "Mount of {} at {} failed; see the log for the tool's output",
                mount.record.remote, mount.record.mount_point
            );
        }
        exited
    }

    /// All mount records, oldest first.
    pub fn records(&self) -> Result<Vec<MountRecord>> {
        self.tracker.list()
    }
}

/// Puts the child in its own session so it outlives the terminal.
#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::config::Settings;
    use crate::modules::process::tests::{rclone_process, FakeProcessTable};
    use tempfile::TempDir;

    fn setup_launcher(processes: &FakeProcessTable) -> (TempDir, Launcher) {
        let temp_dir = tempfile::tempdir().unwrap();
        let tracker = MountTracker::new(temp_dir.path().join("mounts")).unwrap();
        let launcher = Launcher::new(
            RcloneTool::new(Settings::default()),
            tracker,
            Box::new(processes.clone()),
        );
        (temp_dir, launcher)
    }

    fn acads() -> MountEntry {
        MountEntry::new("Acads", "remoteA:", "X:")
    }

    fn cloud() -> MountEntry {
        MountEntry::new("Cloud", "remoteB:", "Y:")
    }

    #[test]
    fn test_unmount_one_by_arguments() -> Result<()> {
        let processes = FakeProcessTable::with(vec![
            rclone_process(10, &["mount", "remoteA:", "X:"]),
            rclone_process(11, &["mount", "remoteB:", "Y:"]),
        ]);
        let (_temp_dir, mut launcher) = setup_launcher(&processes);

        assert!(launcher.unmount_one(&acads())?);
        assert_eq!(*processes.terminated.borrow(), vec![10]);
        Ok(())
    }

    #[test]
    fn test_unmount_one_without_match_leaves_others_alone() -> Result<()> {
        let processes = FakeProcessTable::with(vec![rclone_process(11, &["mount", "remoteB:", "Y:"])]);
        let (_temp_dir, mut launcher) = setup_launcher(&processes);

        assert!(!launcher.unmount_one(&acads())?);
        assert!(processes.terminated.borrow().is_empty());
        assert_eq!(processes.processes.borrow().len(), 1);
        Ok(())
    }

    #[test]
    fn test_unmount_one_prefers_recorded_pid() -> Result<()> {
        let processes = FakeProcessTable::with(vec![
            rclone_process(20, &["mount", "remoteA:", "X:"]),
            rclone_process(21, &["mount", "remoteA:", "X:"]),
        ]);
        let (_temp_dir, mut launcher) = setup_launcher(&processes);
        launcher.tracker.record(&acads(), 21, None)?;

        assert!(launcher.unmount_one(&acads())?);
        assert_eq!(*processes.terminated.borrow(), vec![21]);
        assert!(launcher.records()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unmount_one_with_stale_record_falls_back() -> Result<()> {
        // pid 30 was reused by an unrelated rclone command.
        let processes = FakeProcessTable::with(vec![
            rclone_process(30, &["sync", "remoteA:", "/backup"]),
            rclone_process(31, &["mount", "remoteA:", "X:"]),
        ]);
        let (_temp_dir, mut launcher) = setup_launcher(&processes);
        launcher.tracker.record(&acads(), 30, None)?;

        assert!(launcher.unmount_one(&acads())?);
        assert_eq!(*processes.terminated.borrow(), vec![31]);
        Ok(())
    }

    #[test]
    fn test_unmount_all_global_terminates_every_instance() -> Result<()> {
        let processes = FakeProcessTable::with(vec![
            rclone_process(40, &["mount", "remoteA:", "X:"]),
            rclone_process(41, &["mount", "remoteB:", "Y:"]),
            rclone_process(42, &["mount", "other:", "Q:"]),
        ]);
        let (_temp_dir, mut launcher) = setup_launcher(&processes);
        launcher.tracker.record(&acads(), 40, None)?;
        launcher.tracker.record(&cloud(), 41, None)?;

        assert_eq!(launcher.unmount_all(UnmountScope::Global)?, 3);
        assert_eq!(*processes.terminated.borrow(), vec![40, 41, 42]);
        assert!(launcher.records()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unmount_all_tracked_spares_foreign_mounts() -> Result<()> {
        let processes = FakeProcessTable::with(vec![
            rclone_process(50, &["mount", "remoteA:", "X:"]),
            rclone_process(51, &["mount", "other:", "Q:"]),
        ]);
        let (_temp_dir, mut launcher) = setup_launcher(&processes);
        launcher.tracker.record(&acads(), 50, None)?;

        assert_eq!(launcher.unmount_all(UnmountScope::Tracked)?, 1);
        assert_eq!(*processes.terminated.borrow(), vec![50]);
        assert_eq!(processes.processes.borrow()[0].pid, 51);
        Ok(())
    }

    #[test]
    fn test_mount_missing_tool_is_launch_failure() {
        let processes = FakeProcessTable::default();
        let temp_dir = tempfile::tempdir().unwrap();
        let tool = RcloneTool::new(Settings {
            rclone_binary: temp_dir.path().join("no-such-rclone"),
            ..Settings::default()
        });
        let tracker = MountTracker::new(temp_dir.path().join("mounts")).unwrap();
        let mut launcher = Launcher::new(tool, tracker, Box::new(processes));

        let result = launcher.mount(
            &acads(),
            Path::new("rclone.conf"),
            &temp_dir.path().join("ezmount.log"),
            &Passphrase::empty(),
        );
        assert!(matches!(result, Err(EzMountError::LaunchFailure { .. })));
        assert!(launcher.records().unwrap().is_empty());
    }
}
