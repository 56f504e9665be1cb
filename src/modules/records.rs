//! Mount records.
//!
//! Every launched mount process gets a small JSON record so that a later
//! unmount, possibly from another session, can target the process id
//! instead of searching command lines. Child handles of processes spawned
//! by this session are kept alongside so exited mounts can be reaped.

use super::error::{EzMountError, Result};
use super::registry::{same_mount_point, MountEntry};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Information about a launched mount process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    /// Unique identifier, also the record's file name
    pub id: String,
    /// Process ID of the mount process
    pub pid: u32,
    /// Entry label at launch time
    pub label: String,
    /// Remote that was mounted
    pub remote: String,
    /// Where it was mounted
    pub mount_point: String,
    /// Launch time, seconds since the Unix epoch
    pub started_at: u64,
}

impl MountRecord {
    /// New record with a fresh id for `entry` running as `pid`.
    pub fn new(entry: &MountEntry, pid: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pid,
            label: entry.label.clone(),
            remote: entry.remote.clone(),
            mount_point: entry.mount_point.clone(),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }

    /// Whether the record was written for `entry`.
    pub fn is_for(&self, entry: &MountEntry) -> bool {
        self.remote == entry.remote && same_mount_point(&self.mount_point, &entry.mount_point)
    }
}

/// Mount process exit seen while reaping.
#[derive(Debug)]
pub struct ExitedMount {
    /// Record of the exited process, already removed from disk
    pub record: MountRecord,
    /// Whether it exited with status zero
    pub success: bool,
}

/// Stores mount records and the child handles this session owns.
#[derive(Debug)]
pub struct MountTracker {
    /// Directory where mount records are stored
    records_dir: PathBuf,
    /// Children spawned by this session, by pid
    children: HashMap<u32, Child>,
}

impl MountTracker {
    /// Opens (and creates if needed) the records directory.
    pub fn new(records_dir: impl Into<PathBuf>) -> Result<Self> {
        let records_dir = records_dir.into();
        fs::create_dir_all(&records_dir)
            .map_err(|e| EzMountError::io("creating", &records_dir, e))?;
        Ok(Self {
            records_dir,
            children: HashMap::new(),
        })
    }

    /// Directory holding the records.
    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    /// Records a launched mount. `child` is kept when this session spawned
    /// the process.
    pub fn record(&mut self, entry: &MountEntry, pid: u32, child: Option<Child>) -> Result<MountRecord> {
        let record = MountRecord::new(entry, pid);
        let path = self.record_path(&record.id);
        let encoded = serde_json::to_string(&record).map_err(|source| EzMountError::Record {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, encoded).map_err(|e| EzMountError::io("writing", &path, e))?;
        if let Some(child) = child {
            self.children.insert(pid, child);
        }
        debug!("Recorded mount {} (pid {})", record.label, pid);
        Ok(record)
    }

    /// Lists all readable records. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<MountRecord>> {
        let mut records = Vec::new();
        let entries = fs::read_dir(&self.records_dir)
            .map_err(|e| EzMountError::io("reading", &self.records_dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            match fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<MountRecord>(&content).ok())
            {
                Some(record) => records.push(record),
                None => warn!("Ignoring unreadable mount record {}", path.display()),
            }
        }
        records.sort_by_key(|r| r.started_at);
        Ok(records)
    }

    /// Most recent record for `entry`.
    pub fn find(&self, entry: &MountEntry) -> Result<Option<MountRecord>> {
        Ok(self.list()?.into_iter().rev().find(|r| r.is_for(entry)))
    }

    /// Deletes a record. A child handle stays until [`Self::reap`] sees the
    /// process exit.
    pub fn forget(&self, record: &MountRecord) {
        let path = self.record_path(&record.id);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("Failed to remove mount record {}: {}", path.display(), e);
            }
        }
    }

    /// Whether a child spawned by this session is still running.
    pub fn child_alive(&mut self, pid: u32) -> bool {
        match self.children.get_mut(&pid) {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Collects children that have exited and drops their records.
    pub fn reap(&mut self) -> Vec<ExitedMount> {
        let exited: Vec<(u32, bool)> = self
            .children
            .iter_mut()
            .filter_map(|(pid, child)| match child.try_wait() {
                Ok(Some(status)) => Some((*pid, status.success())),
                _ => None,
            })
            .collect();
        if exited.is_empty() {
            return Vec::new();
        }

        let records = self.list().unwrap_or_default();
        let mut reaped = Vec::new();
        for (pid, success) in exited {
            self.children.remove(&pid);
            if let Some(record) = records.iter().find(|r| r.pid == pid) {
                info!(
                    "Mount process for {} (pid {}) exited{}",
                    record.label,
                    pid,
                    if success { "" } else { " with an error" }
                );
                self.forget(record);
                reaped.push(ExitedMount {
                    record: record.clone(),
                    success,
                });
            }
        }
        reaped
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.records_dir.join(format!("{id}.json"))
    }
}
