//! Mount state checks.

use super::registry::drive_letter;
use std::fmt;
use std::path::Path;

/// Answers whether a mount point is currently occupied.
pub trait MountProbe {
    /// Whether something is mounted at `mount_point`.
    fn is_mounted(&self, mount_point: &str) -> bool;
}

/// Checks the live filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMountProbe;

impl MountProbe for FsMountProbe {
    fn is_mounted(&self, mount_point: &str) -> bool {
        is_mounted(mount_point)
    }
}

/// Whether `mount_point` is occupied.
///
/// A drive designator counts as mounted when its root exists. A directory
/// on Unix counts when it sits on a different device than its parent; a
/// directory elsewhere counts when it exists, since the tool creates it.
pub fn is_mounted(mount_point: &str) -> bool {
    if let Some(letter) = drive_letter(mount_point) {
        return Path::new(&format!("{letter}:\\")).exists();
    }
    directory_is_mounted(Path::new(mount_point))
}

#[cfg(unix)]
fn directory_is_mounted(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let parent = path.join("..");
    match std::fs::metadata(&parent) {
        Ok(parent_meta) => {
            metadata.dev() != parent_meta.dev() || metadata.ino() == parent_meta.ino()
        }
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn directory_is_mounted(path: &Path) -> bool {
    path.exists()
}

/// Status shown for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
    /// The mount point is occupied
    Mounted,
    /// A tracked mount process is running but the mount point is not
    /// attached yet
    Starting,
    /// Nothing is mounted
    Unmounted,
}

impl MountStatus {
    /// Status from whether the mount point is occupied and whether a
    /// tracked mount process is alive.
    pub fn from_observation(mounted: bool, process_alive: bool) -> Self {
        match (mounted, process_alive) {
            (true, _) => Self::Mounted,
            (false, true) => Self::Starting,
            (false, false) => Self::Unmounted,
        }
    }
}

impl fmt::Display for MountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mounted => "mounted",
            Self::Starting => "starting",
            Self::Unmounted => "not mounted",
        })
    }
}
