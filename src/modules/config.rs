//! Settings file and path resolution.
//!
//! Every lookup follows the same order: the session-local directory first,
//! then the user configuration directory.

use super::constants::*;
use super::error::{EzMountError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the passphrase reaches the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialChannel {
    /// `RCLONE_CONFIG_PASS` in the child's environment
    #[default]
    Environment,
    /// A short-lived script passed via `--password-command`
    HelperScript,
}

/// Which processes "unmount all" terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UnmountScope {
    /// Every running instance of the external tool
    #[default]
    Global,
    /// Only processes with a mount record
    Tracked,
}

/// Tunables read from `ezmount.json`. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Program name or path of the external tool
    pub rclone_binary: PathBuf,
    /// Value of `--vfs-cache-mode`
    pub cache_mode: String,
    /// Value of `--log-level`
    pub log_level: String,
    /// Upper bound for the passphrase probe
    pub probe_timeout_secs: u64,
    /// Wait before deleting a helper script handed to a mount process
    pub cleanup_delay_secs: u64,
    /// Passphrase channel
    pub credential_channel: CredentialChannel,
    /// Scope of "unmount all"
    pub unmount_all_scope: UnmountScope,
    /// Flags appended to every mount command
    pub extra_mount_flags: Vec<String>,
    /// Where helper scripts are created; system temp dir when unset
    pub helper_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rclone_binary: PathBuf::from(DEFAULT_RCLONE_BINARY),
            cache_mode: DEFAULT_CACHE_MODE.to_string(),
            log_level: DEFAULT_TOOL_LOG_LEVEL.to_string(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            cleanup_delay_secs: DEFAULT_CLEANUP_DELAY.as_secs(),
            credential_channel: CredentialChannel::default(),
            unmount_all_scope: UnmountScope::default(),
            extra_mount_flags: Vec::new(),
            helper_dir: None,
        }
    }
}

impl Settings {
    /// Reads settings from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                debug!("Loading settings from {}", path.display());
                serde_json::from_str(&text).map_err(|source| EzMountError::Settings {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(EzMountError::io("reading", path, e)),
        }
    }

    /// Upper bound for one `listremotes` check.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Wait before a mount's helper script is deleted.
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }

    /// Directory for helper scripts.
    pub fn helper_dir(&self) -> PathBuf {
        self.helper_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Directories a session works from.
#[derive(Debug, Clone)]
pub struct Locations {
    /// Session-local directory, searched first
    pub local_dir: PathBuf,
    /// User configuration directory (`APPDATA`, `XDG_CONFIG_HOME`, ...)
    pub user_config_dir: Option<PathBuf>,
}

impl Locations {
    /// Uses `local_dir` and the platform's user configuration directory.
    pub fn discover(local_dir: PathBuf) -> Self {
        Self {
            local_dir,
            user_config_dir: dirs::config_dir(),
        }
    }

    /// Credentials file candidates in search order.
    pub fn credentials_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = vec![self.local_dir.join(CREDENTIALS_FILE_NAME)];
        if let Some(dir) = &self.user_config_dir {
            candidates.push(dir.join(CREDENTIALS_DIR_NAME).join(CREDENTIALS_FILE_NAME));
        }
        candidates
    }

    /// First existing credentials file.
    pub fn resolve_credentials(&self) -> Result<PathBuf> {
        let searched = self.credentials_candidates();
        let found = searched.iter().find(|p| p.is_file()).cloned();
        found.ok_or(EzMountError::CredentialsNotFound { searched })
    }

    /// First existing settings file, or the local path if none exists.
    pub fn settings_path(&self) -> PathBuf {
        let local = self.local_dir.join(SETTINGS_FILE_NAME);
        if local.is_file() {
            return local;
        }
        self.app_config_dir()
            .map(|dir| dir.join(SETTINGS_FILE_NAME))
            .filter(|p| p.is_file())
            .unwrap_or(local)
    }

    /// `mounts.csv` in the local directory.
    pub fn table_path(&self) -> PathBuf {
        self.local_dir.join(MOUNT_TABLE_FILE_NAME)
    }

    /// `ezmount.log` in the local directory.
    pub fn log_path(&self) -> PathBuf {
        self.local_dir.join(LOG_FILE_NAME)
    }

    /// Directory holding one JSON record per launched mount process.
    pub fn records_dir(&self) -> PathBuf {
        match self.app_config_dir() {
            Some(dir) => dir.join(RECORDS_DIR_NAME),
            None => self
                .local_dir
                .join(LOCAL_STATE_DIR_NAME)
                .join(RECORDS_DIR_NAME),
        }
    }

    fn app_config_dir(&self) -> Option<PathBuf> {
        self.user_config_dir.as_ref().map(|d| d.join(APP_DIR_NAME))
    }
}

/// Everything a session needs to start.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lookup directories
    pub locations: Locations,
    /// Mount table file
    pub table_path: PathBuf,
    /// Explicit credentials file; skips the search when set
    pub credentials: Option<PathBuf>,
    /// Session log shared with the mount processes
    pub log_path: PathBuf,
    /// Where mount records are kept
    pub records_dir: PathBuf,
    /// Tunables from `ezmount.json`
    pub settings: Settings,
}

impl SessionConfig {
    /// Default paths for `locations` with the settings file loaded.
    pub fn from_locations(locations: Locations) -> Result<Self> {
        let settings = Settings::load(&locations.settings_path())?;
        Ok(Self {
            table_path: locations.table_path(),
            credentials: None,
            log_path: locations.log_path(),
            records_dir: locations.records_dir(),
            settings,
            locations,
        })
    }

    /// Explicit credentials path, or the first one found by the search.
    pub fn resolve_credentials(&self) -> Result<PathBuf> {
        match &self.credentials {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(EzMountError::CredentialsNotFound {
                searched: vec![path.clone()],
            }),
            None => self.locations.resolve_credentials(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn locations(local: &TempDir, user: &TempDir) -> Locations {
        Locations {
            local_dir: local.path().to_path_buf(),
            user_config_dir: Some(user.path().to_path_buf()),
        }
    }

    #[test]
    fn test_local_credentials_win() -> Result<()> {
        let (local, user) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        fs::write(local.path().join(CREDENTIALS_FILE_NAME), "[a]\n").unwrap();
        fs::create_dir_all(user.path().join(CREDENTIALS_DIR_NAME)).unwrap();
        fs::write(
            user.path().join(CREDENTIALS_DIR_NAME).join(CREDENTIALS_FILE_NAME),
            "[b]\n",
        )
        .unwrap();

        let found = locations(&local, &user).resolve_credentials()?;
        assert_eq!(found, local.path().join(CREDENTIALS_FILE_NAME));
        Ok(())
    }

    #[test]
    fn test_user_config_credentials_fallback() -> Result<()> {
        let (local, user) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        let expected = user.path().join(CREDENTIALS_DIR_NAME).join(CREDENTIALS_FILE_NAME);
        fs::create_dir_all(expected.parent().unwrap()).unwrap();
        fs::write(&expected, "[b]\n").unwrap();

        assert_eq!(locations(&local, &user).resolve_credentials()?, expected);
        Ok(())
    }

    #[test]
    fn test_credentials_not_found() {
        let (local, user) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        match locations(&local, &user).resolve_credentials() {
            Err(EzMountError::CredentialsNotFound { searched }) => assert_eq!(searched.len(), 2),
            other => panic!("expected CredentialsNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_settings_defaults_when_missing() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join(SETTINGS_FILE_NAME))?;
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.cache_mode, "full");
        assert_eq!(settings.unmount_all_scope, UnmountScope::Global);
        Ok(())
    }

    #[test]
    fn test_settings_partial_file() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(
            &path,
            r#"{"credential_channel": "helper-script", "unmount_all_scope": "tracked", "cleanup_delay_secs": 0}"#,
        )
        .unwrap();

        let settings = Settings::load(&path)?;
        assert_eq!(settings.credential_channel, CredentialChannel::HelperScript);
        assert_eq!(settings.unmount_all_scope, UnmountScope::Tracked);
        assert_eq!(settings.cleanup_delay(), Duration::ZERO);
        assert_eq!(settings.rclone_binary, PathBuf::from("rclone"));
        Ok(())
    }

    #[test]
    fn test_settings_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(EzMountError::Settings { .. })
        ));
    }

    #[test]
    fn test_records_dir_without_user_config() {
        let local = TempDir::new().unwrap();
        let locations = Locations {
            local_dir: local.path().to_path_buf(),
            user_config_dir: None,
        };
        assert_eq!(
            locations.records_dir(),
            local.path().join(LOCAL_STATE_DIR_NAME).join(RECORDS_DIR_NAME)
        );
    }
}
