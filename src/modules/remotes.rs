//! Remote discovery for generating a mount table.
//!
//! Plain credentials files are read directly; encrypted ones only expose
//! remote names and types through `rclone listremotes --long`. Bucket-style
//! remotes can map to several buckets, each becoming its own entry.

use super::constants::ENCRYPTED_CONFIG_MARKER;
use super::error::{EzMountError, Result};
use super::registry::{is_reserved, MountEntry};
use dialoguer::{Confirm, Input};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// A `[section]` of the credentials file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSection {
    /// Section name, without brackets or colon
    pub name: String,
    /// Value of the `type` key, lower-cased
    pub kind: Option<String>,
    /// Value of `bucket` or `bucket_name`
    pub bucket: Option<String>,
}

impl RemoteSection {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            bucket: None,
        }
    }

    /// Whether the remote is S3-style or names a bucket, so that entries
    /// are made per bucket.
    pub fn wants_buckets(&self) -> bool {
        self.kind.as_deref() == Some("s3") || self.bucket.is_some()
    }
}

/// Whether the credentials text is rclone-encrypted.
pub fn is_encrypted(conf_text: &str) -> bool {
    conf_text
        .lines()
        .any(|line| line.trim_start().starts_with(ENCRYPTED_CONFIG_MARKER))
}

/// Parses the sections of a plain credentials file in file order.
pub fn parse_sections(conf_text: &str) -> Vec<RemoteSection> {
    let mut sections: Vec<RemoteSection> = Vec::new();

    for raw in conf_text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim();
            if !name.is_empty() && !sections.iter().any(|s| s.name == name) {
                sections.push(RemoteSection::named(name));
            }
            continue;
        }
        let (Some(current), Some((key, value))) = (sections.last_mut(), line.split_once('='))
        else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "type" => current.kind = Some(value.to_lowercase()),
            "bucket" | "bucket_name" if !value.is_empty() => {
                current.bucket = Some(value.to_string())
            }
            _ => {}
        }
    }

    sections
}

/// Parses `rclone listremotes` output. Each line is `name:`, or
/// `name: type` with `--long`.
pub fn parse_listremotes(output: &str) -> Vec<RemoteSection> {
    output
        .lines()
        .filter_map(|line| {
            let (name, kind) = line.trim().split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let kind = kind.trim();
            Some(RemoteSection {
                kind: (!kind.is_empty()).then(|| kind.to_lowercase()),
                ..RemoteSection::named(name)
            })
        })
        .collect()
}

/// Splits a comma-separated bucket list, dropping blanks and repeats.
pub fn split_buckets(input: &str) -> Vec<String> {
    let mut buckets: Vec<String> = Vec::new();
    for bucket in input.split(',').map(str::trim).filter(|b| !b.is_empty()) {
        if !buckets.iter().any(|b| b == bucket) {
            buckets.push(bucket.to_string());
        }
    }
    buckets
}

/// Supplies additional buckets for bucket-style remotes.
pub trait BucketSource {
    /// Buckets to map for `section` besides the one in its config.
    fn extra_buckets(&self, section: &RemoteSection) -> Result<Vec<String>>;
}

/// Asks on the terminal, once per bucket-style remote.
pub struct TerminalBuckets;

impl BucketSource for TerminalBuckets {
    fn extra_buckets(&self, section: &RemoteSection) -> Result<Vec<String>> {
        let terminal = |e: std::io::Error| EzMountError::io("reading buckets from", "terminal", e);

        let add_more = Confirm::new()
            .with_prompt(format!(
                "Remote '{}' looks like S3 or has a bucket. Add more buckets?",
                section.name
            ))
            .default(false)
            .interact()
            .map_err(terminal)?;
        if !add_more {
            return Ok(Vec::new());
        }

        let input: String = Input::new()
            .with_prompt(format!("Buckets for '{}' (comma-separated)", section.name))
            .allow_empty(true)
            .interact_text()
            .map_err(terminal)?;
        Ok(split_buckets(&input))
    }
}

/// Buckets given up front as `remote=a,b` specs.
#[derive(Debug, Default)]
pub struct FixedBuckets {
    buckets: HashMap<String, Vec<String>>,
}

impl FixedBuckets {
    /// Parses `remote=a,b` specs. A remote named twice gets both lists.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let mut fixed = Self::default();
        for spec in specs {
            let spec = spec.as_ref();
            let invalid = || EzMountError::InvalidBucketSpec {
                spec: spec.to_string(),
            };
            let (remote, list) = spec.split_once('=').ok_or_else(invalid)?;
            let remote = remote.trim().trim_end_matches(':');
            let list = split_buckets(list);
            if remote.is_empty() || list.is_empty() {
                return Err(invalid());
            }
            let known = fixed.buckets.entry(remote.to_string()).or_default();
            for bucket in list {
                if !known.contains(&bucket) {
                    known.push(bucket);
                }
            }
        }
        Ok(fixed)
    }
}

impl BucketSource for FixedBuckets {
    fn extra_buckets(&self, section: &RemoteSection) -> Result<Vec<String>> {
        Ok(self.buckets.get(&section.name).cloned().unwrap_or_default())
    }
}

/// Hands out mount points for generated entries.
#[derive(Debug)]
pub enum MountPointAllocator {
    /// Drive letters from `X:` downwards, wrapping to `Z:`
    DriveLetters {
        /// Next letter to try
        next: u8,
        /// Letters handed out so far
        issued: HashSet<u8>,
    },
    /// `<base>/<label>` directories
    Directories {
        /// Parent of the generated directories
        base: PathBuf,
    },
}

impl MountPointAllocator {
    /// Allocator handing out `X:`, `W:`, ...
    pub fn drive_letters() -> Self {
        Self::DriveLetters {
            next: b'X',
            issued: HashSet::new(),
        }
    }

    /// Allocator handing out directories under `base`.
    pub fn directories(base: PathBuf) -> Self {
        Self::Directories { base }
    }

    /// The allocator that fits the current platform.
    pub fn for_platform() -> Self {
        if cfg!(windows) {
            return Self::drive_letters();
        }
        match dirs::home_dir() {
            Some(home) => Self::directories(home.join("mnt")),
            None => Self::drive_letters(),
        }
    }

    /// Next mount point, or `None` once every usable letter is taken.
    pub fn allocate(&mut self, label: &str) -> Option<String> {
        match self {
            Self::Directories { base } => Some(base.join(label).display().to_string()),
            Self::DriveLetters { next, issued } => {
                for _ in 0..26 {
                    let letter = *next;
                    *next = if letter == b'A' { b'Z' } else { letter - 1 };
                    let designator = format!("{}:", letter as char);
                    if letter <= b'B' || is_reserved(&designator) || !issued.insert(letter) {
                        continue;
                    }
                    return Some(designator);
                }
                None
            }
        }
    }
}

/// Builds mount entries for `sections`.
///
/// Bucket-style remotes get one `name:bucket` entry per bucket, the
/// configured one first, then those from `buckets`. Without any bucket they
/// mount the remote root, like every other remote.
pub fn suggest_entries(
    sections: &[RemoteSection],
    allocator: &mut MountPointAllocator,
    buckets: &dyn BucketSource,
) -> Result<Vec<MountEntry>> {
    let mut entries = Vec::new();
    for section in sections {
        let mut targets: Vec<(String, String)> = Vec::new();
        if section.wants_buckets() {
            let mut names: Vec<String> = section.bucket.iter().cloned().collect();
            for bucket in buckets.extra_buckets(section)? {
                if !names.contains(&bucket) {
                    names.push(bucket);
                }
            }
            targets.extend(names.into_iter().map(|bucket| {
                (
                    format!("{}:{}", section.name, bucket),
                    format!("{}-{}", section.name, bucket),
                )
            }));
        }
        if targets.is_empty() {
            targets.push((format!("{}:", section.name), section.name.clone()));
        }

        for (remote, label) in targets {
            let Some(mount_point) = allocator.allocate(&label) else {
                return Ok(entries);
            };
            entries.push(MountEntry::new(label, remote, &mount_point));
        }
    }
    Ok(entries)
}
