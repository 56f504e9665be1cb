#![doc(html_root_url = "https://docs.rs/ezmount/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! ezmount: mount rclone remotes from a small table
//!
//! Mounts the remotes listed in a `mounts.csv` table with rclone, using one
//! (possibly encrypted) `rclone.conf`. The passphrase is asked for once per
//! session and handed to every mount process.
//!
//! ## Features
//!
//! - Mount table with label, remote and mount point per row
//! - Credentials lookup in the working directory, then the user config dir
//! - Password gate that validates the passphrase before any mount
//! - Detached mount processes that outlive the session
//! - Unmount by recorded pid, falling back to command-line matching
//! - Table generation from the remotes in the credentials file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ezmount::{FixedPrompt, Locations, Passphrase, Session, SessionConfig};
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let locations = Locations::discover(PathBuf::from("."));
//! let mut session = Session::init(SessionConfig::from_locations(locations)?)?;
//! session.unlock(&FixedPrompt(Passphrase::empty()))?;
//!
//! let report = session.mount_all()?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! ## Mount table
//!
//! ```text
//! label,remote,mount_point
//! Acads,remoteA:,X:
//! Photos,remoteB:photos,/home/me/mnt/photos
//! ```

pub mod modules;

pub use modules::config::{CredentialChannel, Locations, SessionConfig, Settings, UnmountScope};
pub use modules::error::{EzMountError, Result};
pub use modules::menu::MenuAction;
pub use modules::password::{FixedPrompt, Passphrase, PassphrasePrompt, TerminalPrompt};
pub use modules::registry::MountEntry;
pub use modules::session::{Session, SessionState};
