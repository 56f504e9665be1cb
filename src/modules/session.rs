//! Session orchestration.
//!
//! A [`Session`] walks `Init -> PasswordGate -> Ready -> Terminated`. It
//! owns the mount entries, the passphrase and the launcher, and turns menu
//! actions into launches, terminations and status refreshes. Recoverable
//! failures are logged and reported as messages; fatal ones end the session.

use super::config::{SessionConfig, UnmountScope};
use super::error::{EzMountError, Result};
use super::launcher::Launcher;
use super::menu::MenuAction;
use super::monitor::{FsMountProbe, MountProbe, MountStatus};
use super::password::{Passphrase, PassphrasePrompt, PasswordGate};
use super::process::{ProcessTable, SystemProcessTable};
use super::records::MountTracker;
use super::registry::{self, MountEntry};
use super::remotes::{self, BucketSource, MountPointAllocator};
use super::tool::RcloneTool;
use log::{error, info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Resolving credentials and loading the mount table
    Init,
    /// Waiting for the passphrase to be validated
    PasswordGate,
    /// Accepting actions
    Ready,
    /// Finished; no further actions
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "initializing",
            Self::PasswordGate => "waiting for the passphrase",
            Self::Ready => "ready",
            Self::Terminated => "terminated",
        })
    }
}

/// Status line for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStatus {
    /// One-based position in the mount table
    pub number: usize,
    /// The entry
    pub entry: MountEntry,
    /// Observed state
    pub status: MountStatus,
}

/// Result of a single mount request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    /// Mount process started with this pid
    Launched(u32),
    /// The mount point is already occupied; nothing was launched
    InUse,
}

/// Result of "mount all".
#[derive(Debug, Default)]
pub struct MountAllReport {
    /// Labels and pids of launched mounts
    pub launched: Vec<(String, u32)>,
    /// Labels skipped because their mount point is occupied
    pub in_use: Vec<String>,
    /// Labels that failed to launch, with the reason
    pub failed: Vec<(String, String)>,
}

impl fmt::Display for MountAllReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Launched {} mount(s)", self.launched.len())?;
        if !self.in_use.is_empty() {
            write!(f, "; already in use: {}", self.in_use.join(", "))?;
        }
        for (label, reason) in &self.failed {
            write!(f, "; {label} failed: {reason}")?;
        }
        Ok(())
    }
}

/// What the menu loop should do after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Keep going; show this message
    Continue(String),
    /// Leave the menu
    Quit,
}

/// A mount session over one credentials file and mount table.
pub struct Session {
    config: SessionConfig,
    credentials: PathBuf,
    passphrase: Passphrase,
    entries: Vec<MountEntry>,
    state: SessionState,
    launcher: Launcher,
    monitor: Box<dyn MountProbe>,
}

impl Session {
    /// Resolves credentials and loads the mount table against the live
    /// system.
    pub fn init(config: SessionConfig) -> Result<Self> {
        Self::init_with(config, Box::new(SystemProcessTable), Box::new(FsMountProbe))
    }

    /// Like [`Session::init`] with explicit process table and mount probe.
    ///
    /// # Errors
    ///
    /// [`EzMountError::CredentialsNotFound`] or
    /// [`EzMountError::ConfigNotFound`]; both are fatal.
    pub fn init_with(
        config: SessionConfig,
        processes: Box<dyn ProcessTable>,
        monitor: Box<dyn MountProbe>,
    ) -> Result<Self> {
        info!(
            "Session starting in {}",
            config.locations.local_dir.display()
        );

        let credentials = config.resolve_credentials().map_err(log_fatal)?;
        let report = registry::load(&config.table_path).map_err(log_fatal)?;
        let tracker = MountTracker::new(&config.records_dir)?;
        let launcher = Launcher::new(RcloneTool::new(config.settings.clone()), tracker, processes);

        info!(
            "Session started with {} mount entries (credentials {}, {} row(s) skipped)",
            report.entries.len(),
            credentials.display(),
            report.skipped.len()
        );

        Ok(Self {
            config,
            credentials,
            passphrase: Passphrase::empty(),
            entries: report.entries,
            state: SessionState::PasswordGate,
            launcher,
            monitor,
        })
    }

    /// Runs the password gate. On failure the session is terminated.
    pub fn unlock(&mut self, prompt: &dyn PassphrasePrompt) -> Result<()> {
        if self.state != SessionState::PasswordGate {
            return Err(self.not_ready("unlock"));
        }

        match PasswordGate::new(self.launcher.tool()).open(prompt, &self.credentials) {
            Ok(passphrase) => {
                self.passphrase = passphrase;
                self.state = SessionState::Ready;
                info!("Session ready");
                Ok(())
            }
            Err(e) => {
                self.terminate();
                Err(e)
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Entries in table order.
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// The resolved credentials file.
    pub fn credentials(&self) -> &Path {
        &self.credentials
    }

    /// Session log path.
    pub fn log_path(&self) -> &Path {
        &self.config.log_path
    }

    /// Index of the entry named by `target`: a label (case-insensitive) or a
    /// one-based position.
    pub fn find(&self, target: &str) -> Result<usize> {
        let target = target.trim();
        if let Some(index) = self
            .entries
            .iter()
            .position(|e| e.label.eq_ignore_ascii_case(target))
        {
            return Ok(index);
        }
        target
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=self.entries.len()).contains(n))
            .map(|n| n - 1)
            .ok_or_else(|| EzMountError::UnknownEntry {
                target: target.to_string(),
            })
    }

    /// Current status of every entry, in table order.
    pub fn status(&mut self) -> Vec<EntryStatus> {
        self.launcher.reap();
        let mut statuses = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            let mounted = self.monitor.is_mounted(&entry.mount_point);
            let alive = !mounted && self.launcher.is_running(entry);
            statuses.push(EntryStatus {
                number: index + 1,
                entry: entry.clone(),
                status: MountStatus::from_observation(mounted, alive),
            });
        }
        statuses
    }

    /// Mounts the entry at `index`.
    pub fn mount(&mut self, index: usize) -> Result<MountOutcome> {
        self.require_ready("mount")?;
        let entry = self.entry(index)?.clone();

        if self.monitor.is_mounted(&entry.mount_point) {
            warn!(
                "{} is already in use; not mounting {}",
                entry.mount_point, entry.label
            );
            return Ok(MountOutcome::InUse);
        }

        let pid = self.launcher.mount(
            &entry,
            &self.credentials,
            &self.config.log_path,
            &self.passphrase,
        )?;
        Ok(MountOutcome::Launched(pid))
    }

    /// Mounts every entry whose mount point is free. Recoverable failures
    /// are collected in the report, not returned.
    pub fn mount_all(&mut self) -> Result<MountAllReport> {
        self.require_ready("mount")?;
        let mut report = MountAllReport::default();

        for index in 0..self.entries.len() {
            let label = self.entries[index].label.clone();
            match self.mount(index) {
                Ok(MountOutcome::Launched(pid)) => report.launched.push((label, pid)),
                Ok(MountOutcome::InUse) => report.in_use.push(label),
                Err(e) if !e.is_fatal() => {
                    warn!("Could not mount {}: {}", label, e);
                    report.failed.push((label, e.to_string()))
                }
                Err(e) => return Err(e),
            }
        }

        info!("Mount all: {}", report);
        Ok(report)
    }

    /// Stops the mount of the entry at `index`. Returns whether a process
    /// was found.
    pub fn unmount(&mut self, index: usize) -> Result<bool> {
        self.require_active("unmount")?;
        let entry = self.entry(index)?.clone();
        self.launcher.unmount_one(&entry)
    }

    /// Stops mount processes in `scope`, or the configured scope.
    pub fn unmount_all(&mut self, scope: Option<UnmountScope>) -> Result<usize> {
        self.require_active("unmount")?;
        let scope = scope.unwrap_or(self.config.settings.unmount_all_scope);
        self.launcher.unmount_all(scope)
    }

    /// Opens the log in the platform's default viewer.
    pub fn open_log(&self) -> Result<()> {
        self.require_active("open the log")?;
        open_log(&self.config.log_path)
    }

    /// Handles one menu action.
    pub fn dispatch(&mut self, action: MenuAction) -> Result<ActionOutcome> {
        self.require_ready("accept actions")?;

        let message = match action {
            MenuAction::Mount(index) => {
                let entry = self.entry(index)?.clone();
                match self.mount(index) {
                    Ok(MountOutcome::Launched(pid)) => {
                        format!("Mounting {} at {} (pid {pid})", entry.label, entry.mount_point)
                    }
                    Ok(MountOutcome::InUse) => {
                        format!("{} is already in use; {} was not mounted", entry.mount_point, entry.label)
                    }
                    Err(e) if !e.is_fatal() => format!("Could not mount {}: {e}", entry.label),
                    Err(e) => return Err(e),
                }
            }
            MenuAction::Unmount(index) => {
                let entry = self.entry(index)?.clone();
                match self.unmount(index) {
                    Ok(true) => format!("Unmounting {}", entry.label),
                    Ok(false) => format!("{} is not mounted by any running process", entry.label),
                    Err(e) if !e.is_fatal() => format!("Could not unmount {}: {e}", entry.label),
                    Err(e) => return Err(e),
                }
            }
            MenuAction::MountAll => self.mount_all()?.to_string(),
            MenuAction::UnmountAll => match self.unmount_all(None) {
                Ok(count) => format!("Stopped {count} mount process(es)"),
                Err(e) if !e.is_fatal() => format!("Could not unmount: {e}"),
                Err(e) => return Err(e),
            },
            MenuAction::OpenLog => match self.open_log() {
                Ok(()) => format!("Opened {}", self.config.log_path.display()),
                Err(e) => format!("Could not open the log: {e}"),
            },
            MenuAction::Refresh => String::new(),
            MenuAction::Quit => {
                self.terminate();
                return Ok(ActionOutcome::Quit);
            }
        };
        Ok(ActionOutcome::Continue(message))
    }

    /// Ends the session. Mount processes keep running.
    pub fn terminate(&mut self) {
        if self.state != SessionState::Terminated {
            self.state = SessionState::Terminated;
            info!("Session terminated");
        }
    }

    fn entry(&self, index: usize) -> Result<&MountEntry> {
        self.entries
            .get(index)
            .ok_or_else(|| EzMountError::UnknownEntry {
                target: (index + 1).to_string(),
            })
    }

    fn require_ready(&self, action: &'static str) -> Result<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            _ => Err(self.not_ready(action)),
        }
    }

    fn require_active(&self, action: &'static str) -> Result<()> {
        match self.state {
            SessionState::PasswordGate | SessionState::Ready => Ok(()),
            _ => Err(self.not_ready(action)),
        }
    }

    fn not_ready(&self, action: &'static str) -> EzMountError {
        EzMountError::NotReady {
            action,
            state: self.state.to_string(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn log_fatal(err: EzMountError) -> EzMountError {
    error!("{}", err);
    err
}

/// Opens `log_path` in the platform's default viewer.
pub fn open_log(log_path: &Path) -> Result<()> {
    info!("Opening log {}", log_path.display());
    open::that(log_path).map_err(|e| EzMountError::io("opening", log_path, e))
}

/// Writes a mount table generated from the remotes in the credentials file.
///
/// Plain credentials files are parsed directly. Encrypted ones go through
/// the password gate and take the remote names and types from the tool.
/// `buckets` is asked for the buckets of S3-style remotes.
pub fn generate_table(
    config: &SessionConfig,
    prompt: &dyn PassphrasePrompt,
    buckets: &dyn BucketSource,
    allocator: &mut MountPointAllocator,
    force: bool,
) -> Result<Vec<MountEntry>> {
    if config.table_path.exists() && !force {
        return Err(EzMountError::TableExists {
            path: config.table_path.clone(),
        });
    }

    let credentials = config.resolve_credentials()?;
    let text = fs::read_to_string(&credentials)
        .map_err(|e| EzMountError::io("reading", &credentials, e))?;

    let sections = if remotes::is_encrypted(&text) {
        let tool = RcloneTool::new(config.settings.clone());
        let gate = PasswordGate::new(&tool);
        let passphrase = gate.open(prompt, &credentials)?;
        gate.list_remotes(&passphrase, &credentials)?
    } else {
        remotes::parse_sections(&text)
    };

    let entries = remotes::suggest_entries(&sections, allocator, buckets)?;
    registry::write_table(&config.table_path, &entries)?;
    info!(
        "Wrote {} entries to {}",
        entries.len(),
        config.table_path.display()
    );
    Ok(entries)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::modules::config::{CredentialChannel, Locations};
    use crate::modules::constants::HELPER_SCRIPT_PREFIX;
    use crate::modules::password::tests::{fake_settings, ENCRYPTED_CONF, PASSPHRASE, PLAIN_CONF};
    use crate::modules::password::FixedPrompt;
    use crate::modules::remotes::FixedBuckets;
    use crate::modules::process::tests::{rclone_process, FakeProcessTable};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    const TABLE: &str = "label,remote,mount_point\nAcads,remoteA:,X:\nCloud,remoteB:,Y:\n";

    #[derive(Clone, Default)]
    struct FakeMonitor {
        mounted: Rc<RefCell<HashSet<String>>>,
    }

    impl MountProbe for FakeMonitor {
        fn is_mounted(&self, mount_point: &str) -> bool {
            self.mounted.borrow().contains(mount_point)
        }
    }

    struct Fixture {
        dir: TempDir,
        config: SessionConfig,
        processes: FakeProcessTable,
        monitor: FakeMonitor,
    }

    impl Fixture {
        fn new(conf: &str) -> Self {
            Self::with_channel(conf, CredentialChannel::Environment)
        }

        fn with_channel(conf: &str, channel: CredentialChannel) -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("rclone.conf"), conf).unwrap();
            fs::write(dir.path().join("mounts.csv"), TABLE).unwrap();
            let locations = Locations {
                local_dir: dir.path().to_path_buf(),
                user_config_dir: None,
            };
            let config = SessionConfig {
                table_path: locations.table_path(),
                credentials: None,
                log_path: locations.log_path(),
                records_dir: locations.records_dir(),
                settings: fake_settings(dir.path(), channel),
                locations,
            };
            Self {
                dir,
                config,
                processes: FakeProcessTable::default(),
                monitor: FakeMonitor::default(),
            }
        }

        fn session(&self) -> Result<Session> {
            Session::init_with(
                self.config.clone(),
                Box::new(self.processes.clone()),
                Box::new(self.monitor.clone()),
            )
        }

        fn ready_session(&self, passphrase: &str) -> Session {
            let mut session = self.session().unwrap();
            session
                .unlock(&FixedPrompt(Passphrase::new(passphrase)))
                .unwrap();
            session
        }

        /// Mount invocations seen by the fake tool, waiting up to a few
        /// seconds for `expected` of them.
        fn mount_calls(&self, expected: usize) -> Vec<String> {
            let log = self.dir.path().join("calls.log");
            let mut calls = Vec::new();
            for _ in 0..200 {
                calls = fs::read_to_string(&log)
                    .unwrap_or_default()
                    .lines()
                    .filter(|l| l.starts_with("mount "))
                    .map(str::to_string)
                    .collect();
                if calls.len() >= expected {
                    break;
                }
                thread::sleep(Duration::from_millis(25));
            }
            calls
        }
    }

    fn helper_scripts(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(HELPER_SCRIPT_PREFIX))
            })
            .collect()
    }

    #[test]
    fn test_plain_config_blank_passphrase_is_ready() {
        let fixture = Fixture::new(PLAIN_CONF);
        let session = fixture.ready_session("");

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.entries().len(), 2);
        assert_eq!(session.credentials(), fixture.dir.path().join("rclone.conf"));
    }

    #[test]
    fn test_encrypted_config_blank_passphrase_aborts_before_ready() {
        let fixture = Fixture::new(ENCRYPTED_CONF);
        let mut session = fixture.session().unwrap();
        assert_eq!(session.state(), SessionState::PasswordGate);

        let result = session.unlock(&FixedPrompt(Passphrase::empty()));
        assert!(matches!(result, Err(EzMountError::InvalidPassphrase { .. })));
        assert_eq!(session.state(), SessionState::Terminated);

        assert!(matches!(
            session.mount(0),
            Err(EzMountError::NotReady { .. })
        ));
        assert!(matches!(
            session.dispatch(MenuAction::MountAll),
            Err(EzMountError::NotReady { .. })
        ));
        assert!(fixture.mount_calls(0).is_empty());
    }

    #[test]
    fn test_mount_all_launches_one_command_per_entry() -> Result<()> {
        let fixture = Fixture::new(ENCRYPTED_CONF);
        let mut session = fixture.ready_session(PASSPHRASE);

        let report = session.mount_all()?;
        assert_eq!(report.launched.len(), 2);
        assert!(report.failed.is_empty());

        let calls = fixture.mount_calls(2);
        assert_eq!(calls.len(), 2);
        assert!(calls
            .iter()
            .any(|c| c.starts_with("mount remoteA: X: --vfs-cache-mode full")));
        assert!(calls
            .iter()
            .any(|c| c.starts_with("mount remoteB: Y: --vfs-cache-mode full")));
        assert!(calls.iter().all(|c| c.contains("--log-level DEBUG")));
        assert!(calls.iter().all(|c| !c.contains(PASSPHRASE)));
        Ok(())
    }

    #[test]
    fn test_mount_with_helper_script_removes_it_after_launch() -> Result<()> {
        let fixture = Fixture::with_channel(ENCRYPTED_CONF, CredentialChannel::HelperScript);
        let mut session = fixture.ready_session(PASSPHRASE);
        assert!(helper_scripts(fixture.dir.path()).is_empty());

        assert!(matches!(session.mount(0)?, MountOutcome::Launched(_)));
        assert!(helper_scripts(fixture.dir.path()).is_empty());

        let calls = fixture.mount_calls(1);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("mount remoteA: X:"));
        assert!(calls[0].contains("--password-command"));
        assert!(!calls[0].contains(PASSPHRASE));
        Ok(())
    }

    #[test]
    fn test_launch_failure_keeps_session_ready() -> Result<()> {
        let fixture = Fixture::new(PLAIN_CONF);
        let mut session = fixture.ready_session("");
        fs::remove_file(fixture.dir.path().join("rclone")).unwrap();

        let outcome = session.dispatch(MenuAction::Mount(0))?;
        let ActionOutcome::Continue(message) = outcome else {
            panic!("expected the menu to continue, got {outcome:?}");
        };
        assert!(message.starts_with("Could not mount Acads"), "{message}");
        assert_eq!(session.state(), SessionState::Ready);

        assert!(matches!(
            session.mount(1),
            Err(EzMountError::LaunchFailure { .. })
        ));
        assert_eq!(session.state(), SessionState::Ready);
        Ok(())
    }

    #[test]
    fn test_mount_all_io_failure_keeps_menu_running() -> Result<()> {
        let mut fixture = Fixture::with_channel(ENCRYPTED_CONF, CredentialChannel::HelperScript);
        let helpers = fixture.dir.path().join("helpers");
        fs::create_dir(&helpers).unwrap();
        fixture.config.settings.helper_dir = Some(helpers.clone());
        let mut session = fixture.ready_session(PASSPHRASE);
        fs::remove_dir(&helpers).unwrap();

        let outcome = session.dispatch(MenuAction::MountAll)?;
        let ActionOutcome::Continue(message) = outcome else {
            panic!("expected the menu to continue, got {outcome:?}");
        };
        assert!(message.starts_with("Launched 0 mount(s)"), "{message}");
        assert!(message.contains("Acads failed"), "{message}");
        assert!(message.contains("Cloud failed"), "{message}");
        assert_eq!(session.state(), SessionState::Ready);

        fs::create_dir(&helpers).unwrap();
        let report = session.mount_all()?;
        assert_eq!(report.launched.len(), 2);
        assert!(report.failed.is_empty());
        Ok(())
    }

    #[test]
    fn test_mount_records_pid() -> Result<()> {
        let fixture = Fixture::new(PLAIN_CONF);
        let mut session = fixture.ready_session("");

        let outcome = session.mount(1)?;
        let MountOutcome::Launched(pid) = outcome else {
            panic!("expected a launch, got {outcome:?}");
        };
        let tracker = MountTracker::new(&fixture.config.records_dir)?;
        let records = tracker.list()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pid, pid);
        assert_eq!(records[0].label, "Cloud");
        Ok(())
    }

    #[test]
    fn test_mount_skips_mount_point_in_use() -> Result<()> {
        let fixture = Fixture::new(PLAIN_CONF);
        fixture.monitor.mounted.borrow_mut().insert("X:".to_string());
        let mut session = fixture.ready_session("");

        let report = session.mount_all()?;
        assert_eq!(report.in_use, vec!["Acads".to_string()]);
        assert_eq!(report.launched.len(), 1);
        assert_eq!(fixture.mount_calls(1).len(), 1);
        Ok(())
    }

    #[test]
    fn test_status_reflects_monitor() {
        let fixture = Fixture::new(PLAIN_CONF);
        fixture.monitor.mounted.borrow_mut().insert("Y:".to_string());
        let mut session = fixture.session().unwrap();

        let statuses = session.status();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].number, 1);
        assert_eq!(statuses[0].status, MountStatus::Unmounted);
        assert_eq!(statuses[1].status, MountStatus::Mounted);
    }

    #[test]
    fn test_unmount_without_passphrase() -> Result<()> {
        let fixture = Fixture::new(ENCRYPTED_CONF);
        *fixture.processes.processes.borrow_mut() = vec![
            rclone_process(60, &["mount", "remoteA:", "X:"]),
            rclone_process(61, &["mount", "remoteB:", "Y:"]),
        ];
        let mut session = fixture.session()?;

        assert!(session.unmount(1)?);
        assert_eq!(*fixture.processes.terminated.borrow(), vec![61]);
        assert!(!session.unmount(1)?);
        Ok(())
    }

    #[test]
    fn test_unmount_all_is_global_by_default() -> Result<()> {
        let fixture = Fixture::new(PLAIN_CONF);
        *fixture.processes.processes.borrow_mut() = vec![
            rclone_process(70, &["mount", "remoteA:", "X:"]),
            rclone_process(71, &["mount", "somebody-else:", "Q:"]),
        ];
        let mut session = fixture.ready_session("");

        let outcome = session.dispatch(MenuAction::UnmountAll)?;
        assert_eq!(
            outcome,
            ActionOutcome::Continue("Stopped 2 mount process(es)".to_string())
        );
        assert_eq!(*fixture.processes.terminated.borrow(), vec![70, 71]);
        Ok(())
    }

    #[test]
    fn test_dispatch_quit_terminates() -> Result<()> {
        let fixture = Fixture::new(PLAIN_CONF);
        let mut session = fixture.ready_session("");

        assert_eq!(session.dispatch(MenuAction::Quit)?, ActionOutcome::Quit);
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(matches!(
            session.dispatch(MenuAction::Refresh),
            Err(EzMountError::NotReady { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_find_by_label_or_number() -> Result<()> {
        let fixture = Fixture::new(PLAIN_CONF);
        let session = fixture.session()?;

        assert_eq!(session.find("cloud")?, 1);
        assert_eq!(session.find("1")?, 0);
        assert!(matches!(
            session.find("3"),
            Err(EzMountError::UnknownEntry { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_missing_credentials_is_fatal() {
        let fixture = Fixture::new(PLAIN_CONF);
        fs::remove_file(fixture.dir.path().join("rclone.conf")).unwrap();

        let err = fixture.session().err().unwrap();
        assert!(matches!(err, EzMountError::CredentialsNotFound { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let fixture = Fixture::new(PLAIN_CONF);
        fs::remove_file(fixture.dir.path().join("mounts.csv")).unwrap();

        assert!(matches!(
            fixture.session().err(),
            Some(EzMountError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_generate_table_from_plain_config() -> Result<()> {
        let fixture = Fixture::new(PLAIN_CONF);
        let mut allocator = MountPointAllocator::drive_letters();
        let prompt = FixedPrompt(Passphrase::empty());
        let no_buckets = FixedBuckets::default();

        assert!(matches!(
            generate_table(&fixture.config, &prompt, &no_buckets, &mut allocator, false),
            Err(EzMountError::TableExists { .. })
        ));

        let entries = generate_table(&fixture.config, &prompt, &no_buckets, &mut allocator, true)?;
        assert_eq!(
            entries,
            vec![
                MountEntry::new("remoteA", "remoteA:", "X:"),
                MountEntry::new("remoteB-photos", "remoteB:photos", "W:"),
            ]
        );
        assert_eq!(registry::load(&fixture.config.table_path)?.entries, entries);
        Ok(())
    }

    #[test]
    fn test_generate_table_from_encrypted_config() -> Result<()> {
        let fixture = Fixture::new(ENCRYPTED_CONF);
        fs::remove_file(&fixture.config.table_path).unwrap();
        let mut allocator = MountPointAllocator::drive_letters();

        let entries = generate_table(
            &fixture.config,
            &FixedPrompt(Passphrase::new(PASSPHRASE)),
            &FixedBuckets::default(),
            &mut allocator,
            false,
        )?;
        let remotes: Vec<&str> = entries.iter().map(|e| e.remote.as_str()).collect();
        assert_eq!(remotes, vec!["remoteA:", "remoteB:"]);
        Ok(())
    }

    #[test]
    fn test_generate_table_adds_extra_buckets() -> Result<()> {
        let fixture = Fixture::new(ENCRYPTED_CONF);
        let mut allocator = MountPointAllocator::drive_letters();
        let buckets = FixedBuckets::parse(&["remoteA=ignored", "remoteB=photos,videos"])?;

        let entries = generate_table(
            &fixture.config,
            &FixedPrompt(Passphrase::new(PASSPHRASE)),
            &buckets,
            &mut allocator,
            true,
        )?;
        assert_eq!(
            entries,
            vec![
                MountEntry::new("remoteA", "remoteA:", "X:"),
                MountEntry::new("remoteB-photos", "remoteB:photos", "W:"),
                MountEntry::new("remoteB-videos", "remoteB:videos", "V:"),
            ]
        );
        assert_eq!(registry::load(&fixture.config.table_path)?.entries, entries);
        Ok(())
    }

    #[test]
    fn test_generate_table_extra_buckets_follow_config_bucket() -> Result<()> {
        let fixture = Fixture::new(PLAIN_CONF);
        let mut allocator = MountPointAllocator::drive_letters();
        let buckets = FixedBuckets::parse(&["remoteB=photos,archive"])?;

        let entries = generate_table(
            &fixture.config,
            &FixedPrompt(Passphrase::empty()),
            &buckets,
            &mut allocator,
            true,
        )?;
        let remotes: Vec<&str> = entries.iter().map(|e| e.remote.as_str()).collect();
        assert_eq!(remotes, vec!["remoteA:", "remoteB:photos", "remoteB:archive"]);
        Ok(())
    }
}
