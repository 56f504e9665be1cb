//! Mount table loading.
//!
//! The mount table is a small comma-separated file with a header row
//! followed by `label,remote,mount_point` rows. Rows that cannot be used are
//! skipped and reported, the rest of the table still loads.

use super::constants::{MOUNT_TABLE_HEADER, RESERVED_MOUNT_POINTS};
use super::error::{EzMountError, Result};
use log::{debug, warn};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// One remote to mount and where to mount it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Display name
    pub label: String,
    /// rclone remote identifier, e.g. `drive:` or `s3:bucket`
    pub remote: String,
    /// Drive designator (`X:`) or directory path
    pub mount_point: String,
}

impl MountEntry {
    /// Creates an entry, normalizing the mount point.
    pub fn new(label: impl Into<String>, remote: impl Into<String>, mount_point: &str) -> Self {
        Self {
            label: label.into(),
            remote: remote.into(),
            mount_point: normalize_mount_point(mount_point),
        }
    }
}

impl fmt::Display for MountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} -> {})", self.label, self.remote, self.mount_point)
    }
}

/// Result of loading a mount table.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Usable entries in table order
    pub entries: Vec<MountEntry>,
    /// Rows that were skipped, with the reason
    pub skipped: Vec<EzMountError>,
}

/// Loads the mount table at `path`.
///
/// # Errors
///
/// Returns [`EzMountError::ConfigNotFound`] if the file does not exist.
/// Malformed rows do not fail the load; they end up in
/// [`LoadReport::skipped`].
pub fn load(path: &Path) -> Result<LoadReport> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(EzMountError::ConfigNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(EzMountError::io("reading", path, e)),
    };

    let report = parse_table(&text);
    for skipped in &report.skipped {
        warn!("Skipping row in {}: {}", path.display(), skipped);
    }
    debug!(
        "Loaded {} mount entries from {}",
        report.entries.len(),
        path.display()
    );
    Ok(report)
}

/// Parses mount table text. The first non-blank, non-comment line is the
/// header and is skipped.
pub fn parse_table(text: &str) -> LoadReport {
    let mut report = LoadReport::default();
    let mut header_seen = false;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !header_seen {
            header_seen = true;
            continue;
        }

        // Columns are positional; anything past the third is ignored.
        let mut columns = line.split(',').map(clean_field);
        let fields = [columns.next(), columns.next(), columns.next()];
        let line_no = index + 1;

        let [Some(label), Some(remote), Some(mount_point)] = fields else {
            report.skipped.push(malformed(line_no, &fields));
            continue;
        };
        if label.is_empty() || remote.is_empty() || mount_point.is_empty() {
            report.skipped.push(malformed(line_no, &fields));
            continue;
        }

        let entry = MountEntry::new(label, remote, mount_point);
        if is_reserved(&entry.mount_point) {
            report.skipped.push(EzMountError::ReservedMountPoint {
                line: line_no,
                mount_point: entry.mount_point,
            });
            continue;
        }
        report.entries.push(entry);
    }

    report
}

/// Writes `entries` as a mount table, header first.
pub fn write_table(path: &Path, entries: &[MountEntry]) -> Result<()> {
    let mut text = String::from(MOUNT_TABLE_HEADER);
    text.push('\n');
    for entry in entries {
        text.push_str(&format!(
            "{},{},{}\n",
            entry.label, entry.remote, entry.mount_point
        ));
    }
    fs::write(path, text).map_err(|e| EzMountError::io("writing", path, e))
}

fn malformed(line: usize, fields: &[Option<&str>; 3]) -> EzMountError {
    EzMountError::MalformedRow {
        line,
        fields: fields.iter().flatten().filter(|f| !f.is_empty()).count(),
    }
}

fn clean_field(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
        .trim()
}

/// Returns the drive letter if `raw` is a drive designator (`x`, `X:`,
/// `X:\`, `X:/`).
pub fn drive_letter(raw: &str) -> Option<char> {
    let mut chars = raw.trim().chars();
    let letter = chars.next().filter(|c| c.is_ascii_alphabetic())?;
    let rest: String = chars.collect();
    match rest.as_str() {
        "" | ":" | ":\\" | ":/" => Some(letter.to_ascii_uppercase()),
        _ => None,
    }
}

/// Normalizes drive designators to `X:`; trims trailing separators from
/// directory paths. `/` stays `/`.
pub fn normalize_mount_point(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(letter) = drive_letter(raw) {
        return format!("{letter}:");
    }
    let trimmed = raw.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() && !raw.is_empty() {
        return raw[..1].to_string();
    }
    trimmed.to_string()
}

/// Whether two mount point spellings refer to the same location.
pub fn same_mount_point(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_mount_point(a), normalize_mount_point(b));
    if drive_letter(&a).is_some() || drive_letter(&b).is_some() {
        a.eq_ignore_ascii_case(&b)
    } else {
        a == b
    }
}

/// Whether `mount_point` is a reserved system root.
pub fn is_reserved(mount_point: &str) -> bool {
    RESERVED_MOUNT_POINTS
        .iter()
        .any(|reserved| same_mount_point(reserved, mount_point))
}
