//! File hand-off protocol between the core and the external client.
//!
//! - command files: one per account, holding only the latest command
//!   (`minecraft_command.txt` for main, `minecraft_command_<username>.txt` for AFK)
//! - status file: `minecraft_status.json`, written by the client
//!
//! Command delivery is fire-and-forget. A [`Dispatch`] only proves the
//! command reached disk; its effect must be inferred from chat-log output.
//! Two writes before the client's next poll collapse into the second one.

pub mod commands;

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::accounts::AccountKey;

pub use commands::GameCommand;

const MAIN_COMMAND_FILE: &str = "minecraft_command.txt";
const STATUS_FILE: &str = "minecraft_status.json";

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("failed to write command file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Delivery phase of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    /// On disk; not yet known to be executed
    Written,
    /// Confirmed from log evidence. The core never sets this; callers that
    /// correlate chat output against a `Written` receipt do.
    Observed,
}

/// Receipt for a command written to a command file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispatch {
    pub account: String,
    pub command: String,
    pub phase: DispatchPhase,
    pub written_at: u64,
}

/// Client-written liveness record. No schema beyond presence; known keys
/// are typed, everything else is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Paths and operations of the file protocol, rooted at one directory.
#[derive(Debug, Clone)]
pub struct FileProtocol {
    dir: PathBuf,
}

impl FileProtocol {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn command_path(&self, account: &AccountKey) -> PathBuf {
        match account {
            AccountKey::Main => self.dir.join(MAIN_COMMAND_FILE),
            AccountKey::Afk(username) => self.dir.join(format!("minecraft_command_{}.txt", username)),
        }
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    /// Per-account status artifact left behind by older clients.
    pub fn account_status_path(&self, username: &str) -> PathBuf {
        self.dir.join(format!("minecraft_status_{}.json", username))
    }

    /// Replace the account's command file with `command`.
    ///
    /// The contents are swapped in with a rename so the client never reads a
    /// half-written command.
    pub fn send_command(&self, account: &AccountKey, command: &str) -> Result<Dispatch, ProtocolError> {
        let path = self.command_path(account);
        let write_err = |source: std::io::Error| ProtocolError::Write {
            path: path.display().to_string(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(command.as_bytes()).map_err(write_err)?;
        tmp.flush().map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        tracing::info!("[{}] Command written: {}", account, command);
        Ok(Dispatch {
            account: account.to_string(),
            command: command.to_string(),
            phase: DispatchPhase::Written,
            written_at: crate::utils::current_timestamp(),
        })
    }

    pub fn send(&self, account: &AccountKey, command: &GameCommand) -> Result<Dispatch, ProtocolError> {
        self.send_command(account, &command.to_string())
    }

    /// Best-effort read of the status file. Missing or malformed = unknown.
    pub fn read_status(&self) -> Option<StatusRecord> {
        let content = std::fs::read_to_string(self.status_path()).ok()?;
        match serde_json::from_str::<StatusRecord>(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("Status file unreadable: {}", e);
                None
            }
        }
    }

    /// Delete the account's command file and account-scoped status file so a
    /// later reconnect cannot replay a stale command.
    pub fn cleanup(&self, account: &AccountKey) -> Result<(), ProtocolError> {
        remove_if_exists(&self.command_path(account))?;
        if let AccountKey::Afk(username) = account {
            remove_if_exists(&self.account_status_path(username))?;
        }
        Ok(())
    }

    /// Remove leftover per-account status files at startup.
    pub fn cleanup_stale_status_files<'a>(&self, usernames: impl IntoIterator<Item = &'a str>) {
        for username in usernames {
            let path = self.account_status_path(username);
            match remove_if_exists(&path) {
                Ok(true) => tracing::info!("Cleaned up old status file for {}", username),
                Ok(false) => {}
                Err(e) => tracing::warn!("{}", e),
            }
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<bool, ProtocolError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ProtocolError::Remove {
            path: path.display().to_string(),
            source,
        }),
    }
}
