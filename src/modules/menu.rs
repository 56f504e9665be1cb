//! Interactive text menu.

use super::error::{EzMountError, Result};
use super::session::{ActionOutcome, EntryStatus, Session, SessionState};
use dialoguer::Input;
use log::{error, warn};
use std::path::Path;

/// A parsed menu choice. Indices are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// Mount one entry
    Mount(usize),
    /// Unmount one entry
    Unmount(usize),
    /// Mount every entry
    MountAll,
    /// Stop mount processes in the configured scope
    UnmountAll,
    /// Open the session log
    OpenLog,
    /// Redraw the status table
    Refresh,
    /// End the session
    Quit,
}

impl MenuAction {
    /// Parses a menu choice for a table of `count` entries.
    ///
    /// `1..N` mounts, `U1..UN` unmounts, `A` mounts all, `B` unmounts all,
    /// `L` opens the log, `Q` quits. `R` and an empty line refresh.
    /// Letters are case-insensitive.
    pub fn parse(input: &str, count: usize) -> Result<Self> {
        let choice = input.trim().to_ascii_uppercase();
        let invalid = || EzMountError::InvalidChoice {
            input: input.trim().to_string(),
        };
        let entry = |digits: &str| -> Result<usize> {
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            digits
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=count).contains(n))
                .map(|n| n - 1)
                .ok_or_else(invalid)
        };

        match choice.as_str() {
            "" | "R" => Ok(Self::Refresh),
            "A" => Ok(Self::MountAll),
            "B" => Ok(Self::UnmountAll),
            "L" => Ok(Self::OpenLog),
            "Q" => Ok(Self::Quit),
            other => match other.strip_prefix('U') {
                Some(digits) => entry(digits).map(Self::Unmount),
                None => entry(other).map(Self::Mount),
            },
        }
    }
}

/// Renders the status table and the action legend.
pub fn render(credentials: &Path, statuses: &[EntryStatus]) -> String {
    let label_width = statuses
        .iter()
        .map(|s| s.entry.label.len())
        .max()
        .unwrap_or(0)
        .max("Label".len());
    let remote_width = statuses
        .iter()
        .map(|s| s.entry.remote.len())
        .max()
        .unwrap_or(0)
        .max("Remote".len());
    let point_width = statuses
        .iter()
        .map(|s| s.entry.mount_point.len())
        .max()
        .unwrap_or(0)
        .max("Mount point".len());

    let mut out = format!("EZMount - {}\n\n", credentials.display());
    out.push_str(&format!(
        "{:>3}  {:<label_width$}  {:<remote_width$}  {:<point_width$}  Status\n",
        "#", "Label", "Remote", "Mount point"
    ));
    for s in statuses {
        out.push_str(&format!(
            "{:>3}  {:<label_width$}  {:<remote_width$}  {:<point_width$}  {}\n",
            s.number, s.entry.label, s.entry.remote, s.entry.mount_point, s.status
        ));
    }
    if statuses.is_empty() {
        out.push_str("     (no mount entries)\n");
    }

    let n = statuses.len();
    out.push('\n');
    if n > 0 {
        out.push_str(&format!("  1-{n}   mount entry      U1-U{n}  unmount entry\n"));
    }
    out.push_str("  A     mount all        B      unmount all\n");
    out.push_str("  L     open log         R      refresh\n");
    out.push_str("  Q     quit\n");
    out
}

/// Runs the menu until the user quits. The session must be ready.
pub fn run(session: &mut Session) -> Result<()> {
    let mut message = String::new();

    while session.state() == SessionState::Ready {
        let statuses = session.status();
        print!("\x1B[2J\x1B[H");
        println!("{}", render(session.credentials(), &statuses));
        if !message.is_empty() {
            println!("{message}\n");
        }

        let input: String = Input::new()
            .with_prompt("Choice")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| EzMountError::io("reading menu choice from", "terminal", e))?;

        let action = match MenuAction::parse(&input, statuses.len()) {
            Ok(action) => action,
            Err(e) => {
                warn!("{}", e);
                message = e.to_string();
                continue;
            }
        };

        message = match session.dispatch(action) {
            Ok(ActionOutcome::Continue(text)) => text,
            Ok(ActionOutcome::Quit) => break,
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        };
    }
    Ok(())
}
