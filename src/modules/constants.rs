//! File names, defaults and markers shared across modules.

use std::time::Duration;

// Files looked up in the local and user configuration directories
/// Application directory under the user configuration directory
pub const APP_DIR_NAME: &str = "ezmount";
/// Credentials file name
pub const CREDENTIALS_FILE_NAME: &str = "rclone.conf";
/// Directory holding the credentials file under the user configuration
/// directory
pub const CREDENTIALS_DIR_NAME: &str = "rclone";
/// Mount table file name
pub const MOUNT_TABLE_FILE_NAME: &str = "mounts.csv";
/// Session log file name
pub const LOG_FILE_NAME: &str = "ezmount.log";
/// Settings file name
pub const SETTINGS_FILE_NAME: &str = "ezmount.json";
/// Directory of mount records
pub const RECORDS_DIR_NAME: &str = "mounts";
/// Local state directory used when there is no user configuration directory
pub const LOCAL_STATE_DIR_NAME: &str = ".ezmount";

// Mount table
/// First line of a generated mount table
pub const MOUNT_TABLE_HEADER: &str = "label,remote,mount_point";
/// System roots that are never mounted over
pub const RESERVED_MOUNT_POINTS: &[&str] = &["C:", "/"];

// External tool
/// Program looked up on `PATH`
pub const DEFAULT_RCLONE_BINARY: &str = "rclone";
/// Default `--vfs-cache-mode`
pub const DEFAULT_CACHE_MODE: &str = "full";
/// Default `--log-level`
pub const DEFAULT_TOOL_LOG_LEVEL: &str = "DEBUG";
/// Environment variable carrying the passphrase
pub const CONFIG_PASS_ENV: &str = "RCLONE_CONFIG_PASS";
/// Inherited variable that would override the credentials channel
pub const PASSWORD_COMMAND_ENV: &str = "RCLONE_PASSWORD_COMMAND";
/// Line that marks an encrypted credentials file
pub const ENCRYPTED_CONFIG_MARKER: &str = "RCLONE_ENCRYPT_V0:";

// Timing
/// Upper bound for the passphrase check
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);
/// Wait before deleting a mount's helper script
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(3);
/// Seconds between `status --watch` redraws
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 2;

// Helper scripts
/// File name prefix of passphrase helper scripts
pub const HELPER_SCRIPT_PREFIX: &str = ".ezmount-pass-";
