//! Password gate for encrypted credentials files.
//!
//! The passphrase is asked for once per session and checked with the
//! external tool's read-only `listremotes` operation before any mount is
//! launched. A blank passphrase is checked too, so an encrypted credentials
//! file without a passphrase stops the session here instead of producing
//! mounts that fail later.

use super::config::CredentialChannel;
use super::constants::{CONFIG_PASS_ENV, HELPER_SCRIPT_PREFIX, PASSWORD_COMMAND_ENV};
use super::error::{EzMountError, Result};
use super::remotes::{parse_listremotes, RemoteSection};
use super::tool::RcloneTool;
use log::{debug, error, info, warn};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use uuid::Uuid;
use wait_timeout::ChildExt;

/// A credentials passphrase, possibly empty. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    /// Wraps `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The blank passphrase of an unencrypted credentials file.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the passphrase is blank.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The plaintext, for handing to the external tool.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Passphrase(<empty>)")
        } else {
            f.write_str("Passphrase(<redacted>)")
        }
    }
}

/// Source of the session passphrase.
pub trait PassphrasePrompt {
    /// Asks once; an empty passphrase means "not encrypted".
    fn prompt(&self) -> Result<Passphrase>;
}

/// Masked terminal prompt.
pub struct TerminalPrompt;

impl PassphrasePrompt for TerminalPrompt {
    fn prompt(&self) -> Result<Passphrase> {
        dialoguer::Password::new()
            .with_prompt("Config password (leave blank if not encrypted)")
            .allow_empty_password(true)
            .interact()
            .map(Passphrase::new)
            .map_err(|e| EzMountError::io("reading passphrase from", "terminal", e))
    }
}

/// Prompt that always answers with the same passphrase.
pub struct FixedPrompt(pub Passphrase);

impl PassphrasePrompt for FixedPrompt {
    fn prompt(&self) -> Result<Passphrase> {
        Ok(self.0.clone())
    }
}

/// Hidden, uniquely named script that prints the passphrase, for
/// `--password-command`.
///
/// The plaintext sits on disk until the script is removed; it is created
/// readable by the owner only and removed on drop at the latest.
#[derive(Debug)]
pub struct HelperScript {
    path: Option<PathBuf>,
}

impl HelperScript {
    /// Writes a new helper script into `dir`.
    pub fn create(dir: &Path, passphrase: &Passphrase) -> Result<Self> {
        let extension = if cfg!(windows) { "cmd" } else { "sh" };
        let path = dir.join(format!(
            "{HELPER_SCRIPT_PREFIX}{}.{extension}",
            Uuid::new_v4().simple()
        ));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o700);
        }

        let mut file = options
            .open(&path)
            .map_err(|e| EzMountError::io("creating helper script", &path, e))?;
        file.write_all(script_body(passphrase.expose()).as_bytes())
            .map_err(|e| EzMountError::io("writing helper script", &path, e))?;
        debug!("Created helper script {}", path.display());

        Ok(Self { path: Some(path) })
    }

    /// Script path, until it is removed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Deletes the script now. Failure is logged, never returned.
    pub fn remove(mut self) {
        self.remove_inner();
    }

    /// Waits `delay` for the external tool to read the script, then deletes
    /// it.
    pub fn remove_after(self, delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.remove();
    }

    fn remove_inner(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed helper script {}", path.display()),
            Err(source) => {
                let err = EzMountError::CleanupFailure { path, source };
                warn!("{}", err);
            }
        }
    }
}

impl Drop for HelperScript {
    fn drop(&mut self) {
        self.remove_inner();
    }
}

#[cfg(windows)]
fn script_body(secret: &str) -> String {
    let mut escaped = String::with_capacity(secret.len());
    for c in secret.chars() {
        match c {
            '%' => escaped.push_str("%%"),
            '^' | '&' | '|' | '<' | '>' | '"' | '(' | ')' => {
                escaped.push('^');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    format!("@echo off\r\necho({escaped}\r\n")
}

#[cfg(not(windows))]
fn script_body(secret: &str) -> String {
    format!(
        "#!/bin/sh\nprintf '%s\\n' '{}'\n",
        secret.replace('\'', r"'\''")
    )
}

/// Hands `passphrase` to `cmd` through `channel`.
///
/// Returns the helper script when one was created; the caller decides when
/// it is safe to remove it. An empty passphrase attaches nothing and strips
/// inherited credential variables so the tool cannot pick up a passphrase
/// from elsewhere.
pub fn attach_credentials(
    cmd: &mut Command,
    channel: CredentialChannel,
    passphrase: &Passphrase,
    helper_dir: &Path,
) -> Result<Option<HelperScript>> {
    cmd.env_remove(CONFIG_PASS_ENV).env_remove(PASSWORD_COMMAND_ENV);
    if passphrase.is_empty() {
        return Ok(None);
    }

    match channel {
        CredentialChannel::Environment => {
            cmd.env(CONFIG_PASS_ENV, passphrase.expose());
            Ok(None)
        }
        CredentialChannel::HelperScript => {
            let script = HelperScript::create(helper_dir, passphrase)?;
            if let Some(path) = script.path() {
                cmd.arg("--password-command").arg(path);
            }
            Ok(Some(script))
        }
    }
}

/// Outcome of one `listremotes` probe.
#[derive(Debug)]
pub struct ProbeOutcome {
    /// Exit status was zero within the timeout
    pub valid: bool,
    /// Remote names printed by the tool
    pub remotes: Vec<RemoteSection>,
}

/// Validates passphrases against a credentials file.
pub struct PasswordGate<'a> {
    tool: &'a RcloneTool,
}

impl<'a> PasswordGate<'a> {
    /// Gate that checks passphrases with `tool`.
    pub fn new(tool: &'a RcloneTool) -> Self {
        Self { tool }
    }

    /// Whether `passphrase` opens `credentials`.
    pub fn validate(&self, passphrase: &Passphrase, credentials: &Path) -> Result<bool> {
        Ok(self.probe(passphrase, credentials)?.valid)
    }

    /// Remote names from `credentials`, empty when the passphrase is wrong.
    pub fn list_remotes(&self, passphrase: &Passphrase, credentials: &Path) -> Result<Vec<RemoteSection>> {
        Ok(self.probe(passphrase, credentials)?.remotes)
    }

    /// Prompts once and validates.
    ///
    /// # Errors
    ///
    /// [`EzMountError::InvalidPassphrase`] when the probe rejects the
    /// passphrase, blank ones included.
    pub fn open(&self, prompt: &dyn PassphrasePrompt, credentials: &Path) -> Result<Passphrase> {
        let passphrase = prompt.prompt()?;
        if self.validate(&passphrase, credentials)? {
            info!(
                "Credentials {} unlocked ({})",
                credentials.display(),
                if passphrase.is_empty() { "no passphrase" } else { "passphrase" }
            );
            Ok(passphrase)
        } else {
            let err = EzMountError::InvalidPassphrase {
                credentials: credentials.to_path_buf(),
            };
            error!("{}", err);
            Err(err)
        }
    }

    /// Runs `listremotes` with the passphrase attached and waits up to the
    /// probe timeout.
    pub fn probe(&self, passphrase: &Passphrase, credentials: &Path) -> Result<ProbeOutcome> {
        let settings = self.tool.settings();
        let mut cmd = self.tool.probe_command(credentials);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let helper = attach_credentials(
            &mut cmd,
            settings.credential_channel,
            passphrase,
            &settings.helper_dir(),
        )?;

        debug!("Probing {} with listremotes", credentials.display());
        let mut child = cmd.spawn().map_err(|source| EzMountError::LaunchFailure {
            program: self.tool.program(),
            target: "listremotes".to_string(),
            source,
        })?;

        // Drain stdout while waiting so a long remote list cannot fill the
        // pipe and stall the child.
        let reader = child.stdout.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut stdout = String::new();
                let _ = pipe.read_to_string(&mut stdout);
                stdout
            })
        });

        let timeout = settings.probe_timeout();
        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => Some(status),
            Ok(None) => {
                warn!("listremotes did not finish within {}s", timeout.as_secs());
                let _ = child.kill();
                let _ = child.wait();
                None
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EzMountError::io("waiting for", self.tool.program(), e));
            }
        };

        // The probe has exited, so the helper script has been read.
        if let Some(helper) = helper {
            helper.remove();
        }

        let stdout = reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        let valid = status.map(|s| s.success()).unwrap_or(false);
        if !valid {
            debug!("listremotes rejected {} ({:?})", credentials.display(), status);
        }
        Ok(ProbeOutcome {
            valid,
            remotes: if valid { parse_listremotes(&stdout) } else { Vec::new() },
        })
    }
}
