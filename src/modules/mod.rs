//! Core modules.
//!
//! - `registry`: the mount table
//! - `config`: locations, settings and session configuration
//! - `password`: passphrase prompt, credential channels and the password gate
//! - `launcher`: starting and stopping mount processes
//! - `session`: the session state machine
//! - `menu`: the interactive menu

pub mod config;
pub mod constants;
pub mod error;
/// Starting and stopping mount processes.
pub mod launcher;
pub mod logging;
pub mod menu;
/// Mount point state.
pub mod monitor;
pub mod password;
pub mod process;
pub mod records;
pub mod registry;
/// Remotes found in the credentials file and generated mount tables.
pub mod remotes;
pub mod session;
pub mod tool;
