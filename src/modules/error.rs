//! Error taxonomy shared by every module.
//!
//! Fatal variants end the session before it reaches the ready state; the
//! recoverable ones are logged and reported without stopping the session.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, unlocking and driving a mount session.
#[derive(Debug, Error)]
pub enum EzMountError {
    /// The mount table does not exist.
    #[error("mount table not found: {path}")]
    ConfigNotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// A mount table row has fewer than three non-empty fields.
    #[error("line {line} of the mount table has {fields} usable field(s), expected 3")]
    MalformedRow {
        /// One-based line number
        line: usize,
        /// Number of non-empty fields found
        fields: usize,
    },

    /// A mount table row targets a reserved system root.
    #[error("line {line} of the mount table uses reserved mount point {mount_point}")]
    ReservedMountPoint {
        /// One-based line number
        line: usize,
        /// The offending mount point
        mount_point: String,
    },

    /// No credentials file in any of the searched locations.
    #[error("credentials file not found (searched: {})", display_paths(.searched))]
    CredentialsNotFound {
        /// Locations searched, in order
        searched: Vec<PathBuf>,
    },

    /// The passphrase does not unlock the credentials file.
    #[error("the passphrase does not unlock {credentials}")]
    InvalidPassphrase {
        /// Credentials file that was probed
        credentials: PathBuf,
    },

    /// The external tool could not be started.
    #[error("failed to launch {program} for {target}: {source}")]
    LaunchFailure {
        /// Program that was spawned
        program: String,
        /// What the launch was for (an entry label or the probe)
        target: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// No running process matched an unmount request.
    #[error("no running mount process for {label}")]
    NoMatchingProcess {
        /// Label of the entry
        label: String,
    },

    /// A passphrase helper script could not be deleted.
    #[error("failed to remove helper script {path}: {source}")]
    CleanupFailure {
        /// Helper script path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A menu choice that does not name an action.
    #[error("invalid choice '{input}'")]
    InvalidChoice {
        /// Raw input
        input: String,
    },

    /// No entry has the given label or index.
    #[error("no mount entry named '{target}'")]
    UnknownEntry {
        /// Label or index that was requested
        target: String,
    },

    /// A `remote=bucket,...` argument that names no remote or no bucket.
    #[error("invalid bucket list '{spec}', expected REMOTE=BUCKET[,BUCKET...]")]
    InvalidBucketSpec {
        /// Raw argument
        spec: String,
    },

    /// `init` would overwrite an existing mount table.
    #[error("mount table {path} already exists (use --force to overwrite)")]
    TableExists {
        /// Existing table
        path: PathBuf,
    },

    /// An action was requested in a state that does not accept it.
    #[error("cannot {action} while the session is {state}")]
    NotReady {
        /// Requested action
        action: &'static str,
        /// Current session state
        state: String,
    },

    /// The settings file exists but cannot be parsed.
    #[error("invalid settings file {path}: {source}")]
    Settings {
        /// Settings file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// A mount record could not be encoded or decoded.
    #[error("invalid mount record {path}: {source}")]
    Record {
        /// Record file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// I/O failure with context.
    #[error("I/O error while {operation} {path}: {source}")]
    Io {
        /// What was being done
        operation: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl EzMountError {
    /// Builds an [`EzMountError::Io`] for `path`.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether the error ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::CredentialsNotFound { .. }
                | Self::InvalidPassphrase { .. }
                | Self::Settings { .. }
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, EzMountError>;
