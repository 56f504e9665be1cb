//! Command lines for the external mounting tool.

use super::config::Settings;
use super::registry::MountEntry;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

/// Builds `rclone` invocations from the session settings.
#[derive(Debug, Clone)]
pub struct RcloneTool {
    settings: Settings,
}

impl RcloneTool {
    /// Creates a tool driven by `settings`.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// The settings every command is built from.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Program name without directory or extension, as shown in process
    /// listings.
    pub fn process_name(&self) -> String {
        self.settings
            .rclone_binary
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Arguments of the read-only `listremotes` check. `--long` adds each
    /// remote's type to the output.
    pub fn probe_args(&self, credentials: &Path) -> Vec<OsString> {
        vec![
            "listremotes".into(),
            "--long".into(),
            "--config".into(),
            credentials.into(),
            "--ask-password=false".into(),
        ]
    }

    /// Arguments of a mount invocation for `entry`.
    pub fn mount_args(&self, entry: &MountEntry, credentials: &Path, log_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "mount".into(),
            entry.remote.as_str().into(),
            entry.mount_point.as_str().into(),
            "--vfs-cache-mode".into(),
            self.settings.cache_mode.as_str().into(),
            "--config".into(),
            credentials.into(),
            "--log-file".into(),
            log_path.into(),
            "--log-level".into(),
            self.settings.log_level.as_str().into(),
            "--ask-password=false".into(),
        ];
        args.extend(self.settings.extra_mount_flags.iter().map(OsString::from));
        args
    }

    /// `listremotes` command for `credentials`, without stdio or credentials
    /// attached.
    pub fn probe_command(&self, credentials: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.rclone_binary);
        cmd.args(self.probe_args(credentials));
        cmd
    }

    /// Mount command for `entry`, without stdio or credentials attached.
    pub fn mount_command(&self, entry: &MountEntry, credentials: &Path, log_path: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.rclone_binary);
        cmd.args(self.mount_args(entry, credentials, log_path));
        cmd
    }

    /// Program as shown in error messages.
    pub fn program(&self) -> String {
        self.settings.rclone_binary.display().to_string()
    }
}
