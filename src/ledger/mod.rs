//! Durable verification and balance store.
//!
//! The whole store is rewritten on every mutation. A mutation is applied to a
//! copy, the copy is flushed, and only then does it replace the live data, so
//! a failed write leaves memory and disk in agreement.

pub mod wager;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::amount::AmountError;
use crate::utils::current_timestamp;

pub use wager::{WagerOutcome, WagerResult};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("No verified user '{0}'")]
    UnknownUser(String),
    #[error("Invalid Minecraft username '{0}'")]
    InvalidUsername(String),
    #[error("Minecraft username '{username}' is already verified by another user")]
    UsernameTaken { username: String },
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),
    #[error("Stake must be positive")]
    NonPositiveStake,
    #[error("Insufficient balance: have {balance}, staked {stake}")]
    InsufficientBalance { balance: Decimal, stake: Decimal },
    #[error("Ledger task failed: {0}")]
    Task(String),
}

impl LedgerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownUser(_) => StatusCode::NOT_FOUND,
            Self::UsernameTaken { .. } => StatusCode::CONFLICT,
            Self::InvalidUsername(_)
            | Self::InvalidAmount(_)
            | Self::NonPositiveStake
            | Self::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            Self::Io { .. } | Self::Serialize(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "IO_ERROR",
            Self::Serialize(_) => "SERIALIZE_ERROR",
            Self::UnknownUser(_) => "UNKNOWN_USER",
            Self::InvalidUsername(_) => "INVALID_USERNAME",
            Self::UsernameTaken { .. } => "USERNAME_TAKEN",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::NonPositiveStake => "NON_POSITIVE_STAKE",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::Task(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}

impl axum::response::IntoResponse for LedgerError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), axum::Json(self.to_json())).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedUser {
    pub minecraft_username: String,
    pub balance: Decimal,
    #[serde(default)]
    pub verification_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingVerification {
    pub minecraft_username: String,
    /// Unix seconds; never used to expire entries
    #[serde(rename = "timestamp")]
    pub created_at: f64,
}

/// On-disk snapshot. Keys are external (Discord) ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerData {
    #[serde(default)]
    pub verified_users: BTreeMap<String, VerifiedUser>,
    #[serde(default)]
    pub pending_verifications: BTreeMap<String, PendingVerification>,
    /// Consumed byte offset into the chat log
    #[serde(default)]
    pub chat_offset: Option<u64>,
    #[serde(default)]
    pub last_saved: f64,
}

impl LedgerData {
    fn verified_by_username(&self, username: &str) -> Option<&String> {
        self.verified_users
            .iter()
            .find(|(_, u)| u.minecraft_username.eq_ignore_ascii_case(username))
            .map(|(id, _)| id)
    }

    fn pending_by_username(&self, username: &str) -> Option<&String> {
        self.pending_verifications
            .iter()
            .find(|(_, p)| p.minecraft_username.eq_ignore_ascii_case(username))
            .map(|(id, _)| id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub external_id: String,
    pub minecraft_username: String,
    pub balance: Decimal,
}

/// Balance change caused by a payment notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub external_id: String,
    pub amount: Decimal,
    pub balance: Decimal,
}

/// Minecraft Java usernames: 3-16 word characters.
pub fn validate_username(username: &str) -> Result<(), LedgerError> {
    let valid = (3..=16).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidUsername(username.to_string()))
    }
}

pub struct LedgerStore {
    path: PathBuf,
    data: LedgerData,
    /// In-memory changes (offset advances) not yet on disk
    dirty: bool,
}

impl LedgerStore {
    /// Open the store at `path`. A missing file is an empty store. A file
    /// that does not parse is moved aside to `<name>.corrupt-<ts>` and the
    /// store starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<LedgerData>(&content) {
                Ok(data) => {
                    tracing::info!(
                        "Loaded ledger: {} verified users, {} pending",
                        data.verified_users.len(),
                        data.pending_verifications.len()
                    );
                    data
                }
                Err(e) => {
                    let aside = path.with_extension(format!("corrupt-{}", current_timestamp()));
                    tracing::error!("Ledger {} is corrupt ({}), moving it to {}", path.display(), e, aside.display());
                    std::fs::rename(&path, &aside).map_err(|source| LedgerError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
                    LedgerData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No existing ledger at {}, starting fresh", path.display());
                LedgerData::default()
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Ok(Self { path, data, dirty: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &LedgerData {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn write_snapshot(&self, data: &mut LedgerData) -> Result<(), LedgerError> {
        data.last_saved = current_timestamp() as f64;
        let json = serde_json::to_vec_pretty(data)?;
        let io_err = |source: std::io::Error| LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Apply `f` to a copy, flush it, then swap it in.
    fn mutate<T>(&mut self, f: impl FnOnce(&mut LedgerData) -> Result<T, LedgerError>) -> Result<T, LedgerError> {
        let mut next = self.data.clone();
        let value = f(&mut next)?;
        self.write_snapshot(&mut next)?;
        self.data = next;
        self.dirty = false;
        Ok(value)
    }

    /// Write the current state. Used by the periodic snapshot and at shutdown.
    pub fn flush(&mut self) -> Result<(), LedgerError> {
        let mut data = self.data.clone();
        self.write_snapshot(&mut data)?;
        self.data.last_saved = data.last_saved;
        self.dirty = false;
        tracing::debug!("Saved ledger to {}", self.path.display());
        Ok(())
    }

    pub fn chat_offset(&self) -> Option<u64> {
        self.data.chat_offset
    }

    /// Move the chat offset past lines that changed nothing. Persisted with
    /// the next mutation or snapshot.
    pub fn advance_offset(&mut self, offset: u64) {
        if self.data.chat_offset != Some(offset) {
            self.data.chat_offset = Some(offset);
            self.dirty = true;
        }
    }

    // ─── Verification ────────────────────────────────────────

    /// Start (or restart) verification of `external_id` as `username`.
    pub fn register_pending(&mut self, external_id: &str, username: &str) -> Result<PendingVerification, LedgerError> {
        validate_username(username)?;
        let verified = self.data.verified_by_username(username);
        let pending = self
            .data
            .pending_verifications
            .iter()
            .find(|(id, p)| id.as_str() != external_id && p.minecraft_username.eq_ignore_ascii_case(username))
            .map(|(id, _)| id);
        if let Some(owner) = verified.or(pending) {
            if owner != external_id {
                return Err(LedgerError::UsernameTaken {
                    username: username.to_string(),
                });
            }
        }
        let pending = PendingVerification {
            minecraft_username: username.to_string(),
            created_at: current_timestamp() as f64,
        };
        let record = pending.clone();
        self.mutate(|data| {
            data.pending_verifications.insert(external_id.to_string(), record);
            Ok(())
        })?;
        tracing::info!("Verification pending for {} as {}", external_id, username);
        Ok(pending)
    }

    /// Admin path: mark `external_id` verified without a whisper. An existing
    /// balance is kept.
    pub fn verify_manual(&mut self, external_id: &str, username: &str) -> Result<VerifiedUser, LedgerError> {
        validate_username(username)?;
        if let Some(owner) = self.data.verified_by_username(username) {
            if owner != external_id {
                return Err(LedgerError::UsernameTaken {
                    username: username.to_string(),
                });
            }
        }
        let user = self.mutate(|data| {
            let balance = data
                .verified_users
                .get(external_id)
                .map(|u| u.balance)
                .unwrap_or(Decimal::ZERO);
            let user = VerifiedUser {
                minecraft_username: username.to_string(),
                balance,
                verification_pending: false,
            };
            data.verified_users.insert(external_id.to_string(), user.clone());
            data.pending_verifications.remove(external_id);
            Ok(user)
        })?;
        tracing::info!("Manually verified {} as {}", external_id, username);
        Ok(user)
    }

    /// Promote the pending entry for `username`, advancing the chat offset to
    /// `offset` in the same write. `None` when nothing is pending.
    pub fn promote_by_game_username(
        &mut self,
        username: &str,
        offset: Option<u64>,
    ) -> Result<Option<(String, VerifiedUser)>, LedgerError> {
        let Some(external_id) = self.data.pending_by_username(username).cloned() else {
            return Ok(None);
        };
        if let Some(owner) = self.data.verified_by_username(username) {
            if *owner != external_id {
                tracing::warn!(
                    "Verify whisper from {} ignored: name already verified for {}, pending for {}",
                    username,
                    owner,
                    external_id
                );
                return Ok(None);
            }
        }

        let promoted = self.mutate(|data| {
            let pending = data.pending_verifications.remove(&external_id);
            let minecraft_username = pending.map(|p| p.minecraft_username).unwrap_or_else(|| username.to_string());
            // re-verification keeps the existing balance
            let balance = data
                .verified_users
                .get(&external_id)
                .map(|u| u.balance)
                .unwrap_or(Decimal::ZERO);
            let user = VerifiedUser {
                minecraft_username,
                balance,
                verification_pending: false,
            };
            data.verified_users.insert(external_id.clone(), user.clone());
            if offset.is_some() {
                data.chat_offset = offset;
            }
            Ok(user)
        })?;
        tracing::info!("Verified user {} as {}", external_id, promoted.minecraft_username);
        Ok(Some((external_id, promoted)))
    }

    // ─── Balances ────────────────────────────────────────────

    /// Credit the verified user playing as `username`. `None` when no
    /// verified user matches; the payment is dropped.
    pub fn credit_by_game_username(
        &mut self,
        username: &str,
        amount: Decimal,
        offset: Option<u64>,
    ) -> Result<Option<Credit>, LedgerError> {
        let Some(external_id) = self.data.verified_by_username(username).cloned() else {
            return Ok(None);
        };
        let balance = self.mutate(|data| {
            let user = data
                .verified_users
                .get_mut(&external_id)
                .ok_or_else(|| LedgerError::UnknownUser(external_id.clone()))?;
            user.balance += amount;
            let balance = user.balance;
            if offset.is_some() {
                data.chat_offset = offset;
            }
            Ok(balance)
        })?;
        tracing::info!("Added ${} to {}'s balance (now ${})", amount, username, balance);
        Ok(Some(Credit {
            external_id,
            amount,
            balance,
        }))
    }

    /// Settle a wager. Validation happens before `draw` is called, so a
    /// rejected stake never consumes randomness.
    pub fn settle_wager(
        &mut self,
        external_id: &str,
        stake: Decimal,
        draw: impl FnOnce() -> WagerOutcome,
    ) -> Result<WagerResult, LedgerError> {
        let user = self
            .data
            .verified_users
            .get(external_id)
            .ok_or_else(|| LedgerError::UnknownUser(external_id.to_string()))?;
        wager::validate_stake(stake, user.balance)?;

        let outcome = draw();
        let balance = self.mutate(|data| {
            let user = data
                .verified_users
                .get_mut(external_id)
                .ok_or_else(|| LedgerError::UnknownUser(external_id.to_string()))?;
            match outcome {
                WagerOutcome::Won => user.balance += stake,
                WagerOutcome::Lost => user.balance -= stake,
            }
            Ok(user.balance)
        })?;
        tracing::info!("Wager by {}: staked ${}, {:?}, balance now ${}", external_id, stake, outcome, balance);
        Ok(WagerResult {
            external_id: external_id.to_string(),
            stake,
            outcome,
            balance,
        })
    }

    // ─── Reads ───────────────────────────────────────────────

    pub fn get(&self, external_id: &str) -> Option<&VerifiedUser> {
        self.data.verified_users.get(external_id)
    }

    pub fn pending(&self, external_id: &str) -> Option<&PendingVerification> {
        self.data.pending_verifications.get(external_id)
    }

    pub fn balance(&self, external_id: &str) -> Option<Decimal> {
        self.get(external_id).map(|u| u.balance)
    }

    pub fn verified_count(&self) -> usize {
        self.data.verified_users.len()
    }

    pub fn pending_count(&self) -> usize {
        self.data.pending_verifications.len()
    }

    /// Verified users by balance, highest first. Ties keep id order.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut users: Vec<(&String, &VerifiedUser)> = self.data.verified_users.iter().collect();
        users.sort_by(|a, b| b.1.balance.cmp(&a.1.balance));
        users
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (id, user))| LeaderboardEntry {
                rank: i + 1,
                external_id: id.clone(),
                minecraft_username: user.minecraft_username.clone(),
                balance: user.balance,
            })
            .collect()
    }
}

/// Store handle shared between the chat scanner, jobs and IPC handlers.
///
/// Every access takes the lock on the blocking pool, so a mutation and its
/// flush run as one uninterrupted sequence off the async workers.
#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<LedgerStore>>,
}

impl SharedLedger {
    pub fn new(store: LedgerStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub async fn with<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut LedgerStore) -> Result<T, LedgerError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut store = inner.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut store)
        })
        .await
        .map_err(|e| LedgerError::Task(e.to_string()))?
    }

    /// Synchronous access for callers already off the async workers.
    pub fn with_blocking<T>(&self, f: impl FnOnce(&mut LedgerStore) -> T) -> T {
        let mut store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut store)
    }

    /// Flush only when the offset moved since the last write.
    pub async fn snapshot(&self) -> Result<bool, LedgerError> {
        self.with(|store| {
            if store.is_dirty() {
                store.flush()?;
                Ok(true)
            } else {
                Ok(false)
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> LedgerStore {
        LedgerStore::load(dir.join("gambling_data.json")).unwrap()
    }

    fn reload(store: &LedgerStore) -> LedgerStore {
        LedgerStore::load(store.path()).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        assert_eq!(s.verified_count(), 0);
        assert_eq!(s.chat_offset(), None);
        assert!(!s.path().exists());
    }

    #[test]
    fn test_pending_then_promote_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        s.register_pending("1001", "Alice").unwrap();
        assert_eq!(reload(&s).pending_count(), 1);

        let (id, user) = s.promote_by_game_username("alice", Some(128)).unwrap().unwrap();
        assert_eq!(id, "1001");
        assert_eq!(user.minecraft_username, "Alice");
        assert_eq!(user.balance, Decimal::ZERO);

        let on_disk = reload(&s);
        assert_eq!(on_disk.pending_count(), 0);
        assert_eq!(on_disk.get("1001"), Some(&user));
        assert_eq!(on_disk.chat_offset(), Some(128));

        // nothing left to promote
        assert!(s.promote_by_game_username("Alice", Some(200)).unwrap().is_none());
        assert_eq!(s.chat_offset(), Some(128));
    }

    #[test]
    fn test_credit_requires_verified_payer() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        s.verify_manual("1001", "Alice").unwrap();

        assert!(s
            .credit_by_game_username("Bob", Decimal::from(5), Some(10))
            .unwrap()
            .is_none());
        assert_eq!(s.balance("1001"), Some(Decimal::ZERO));

        let credit = s
            .credit_by_game_username("Alice", Decimal::from(2_500_000), Some(20))
            .unwrap()
            .unwrap();
        assert_eq!(credit.balance, Decimal::from(2_500_000));
        assert_eq!(reload(&s).balance("1001"), Some(Decimal::from(2_500_000)));
    }

    #[test]
    fn test_manual_verify_keeps_balance_and_drops_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        s.verify_manual("1001", "Alice").unwrap();
        s.credit_by_game_username("Alice", Decimal::from(50), None).unwrap();
        s.register_pending("1001", "Alice_Alt").unwrap();

        let user = s.verify_manual("1001", "Alice_Alt").unwrap();
        assert_eq!(user.balance, Decimal::from(50));
        assert!(s.pending("1001").is_none());
    }

    #[test]
    fn test_username_claimed_by_other_user_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        s.verify_manual("1001", "Alice").unwrap();
        assert!(matches!(
            s.register_pending("2002", "ALICE"),
            Err(LedgerError::UsernameTaken { .. })
        ));
        assert!(matches!(s.register_pending("2002", "a b"), Err(LedgerError::InvalidUsername(_))));
        s.register_pending("1001", "Alice").unwrap();
    }

    #[test]
    fn test_pending_username_is_held_by_first_claimant() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        s.register_pending("1001", "Alice").unwrap();
        assert!(matches!(
            s.register_pending("2002", "alice"),
            Err(LedgerError::UsernameTaken { .. })
        ));
        // the claimant may re-register
        s.register_pending("1001", "Alice").unwrap();
        assert_eq!(s.pending_count(), 1);

        let (id, _) = s.promote_by_game_username("Alice", Some(10)).unwrap().unwrap();
        assert_eq!(id, "1001");
        s.credit_by_game_username("Alice", Decimal::from(100), Some(20)).unwrap();
        assert_eq!(s.balance("1001"), Some(Decimal::from(100)));
        assert_eq!(s.balance("2002"), None);
    }

    #[test]
    fn test_promotion_refused_when_name_verified_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        s.register_pending("2002", "Alice").unwrap();
        s.verify_manual("1001", "Alice").unwrap();

        assert!(s.promote_by_game_username("Alice", Some(10)).unwrap().is_none());
        assert!(s.get("2002").is_none());
        assert!(s.pending("2002").is_some());
        assert_eq!(s.verified_count(), 1);
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gambling_data.json");
        std::fs::write(&path, "{ not json").unwrap();

        let s = LedgerStore::load(&path).unwrap();
        assert_eq!(s.verified_count(), 0);
        assert!(!path.exists());
        let aside: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupt-"))
            .collect();
        assert_eq!(aside.len(), 1);
    }

    #[test]
    fn test_loads_legacy_float_balances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gambling_data.json");
        std::fs::write(
            &path,
            r#"{
                "verified_users": {"1001": {"minecraft_username": "Alice", "balance": 1500000.0, "verification_pending": false}},
                "pending_verifications": {"2002": {"minecraft_username": "Bob", "timestamp": 1712345678.25}},
                "last_saved": 1712345679.0
            }"#,
        )
        .unwrap();
        let s = LedgerStore::load(&path).unwrap();
        assert_eq!(s.balance("1001"), Some(Decimal::from(1_500_000)));
        assert_eq!(s.pending("2002").unwrap().minecraft_username, "Bob");
        assert_eq!(s.chat_offset(), None);
    }

    #[test]
    fn test_failed_flush_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("data");
        std::fs::create_dir(&sub).unwrap();
        let mut s = LedgerStore::load(sub.join("gambling_data.json")).unwrap();
        s.verify_manual("1001", "Alice").unwrap();

        std::fs::remove_dir_all(&sub).unwrap();
        let err = s.credit_by_game_username("Alice", Decimal::from(10), Some(5)).unwrap_err();
        assert!(matches!(err, LedgerError::Io { .. }));
        assert_eq!(s.balance("1001"), Some(Decimal::ZERO));
        assert_eq!(s.chat_offset(), None);
    }

    #[test]
    fn test_leaderboard_orders_by_balance() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        for (id, name, amount) in [("1", "Low", 5), ("2", "High", 500), ("3", "Mid", 50)] {
            s.verify_manual(id, name).unwrap();
            s.credit_by_game_username(name, Decimal::from(amount), None).unwrap();
        }
        let board = s.leaderboard(2);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].minecraft_username, "High");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].minecraft_username, "Mid");
    }

    #[test]
    fn test_offset_advance_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = store(dir.path());
        s.advance_offset(64);
        assert!(s.is_dirty());
        s.flush().unwrap();
        assert!(!s.is_dirty());
        assert_eq!(reload(&s).chat_offset(), Some(64));
    }

    #[tokio::test]
    async fn test_shared_ledger_snapshot_only_when_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedLedger::new(store(dir.path()));
        assert!(!shared.snapshot().await.unwrap());
        shared.with_blocking(|s| s.advance_offset(3));
        assert!(shared.snapshot().await.unwrap());
        let offset = shared.with(|s| Ok(s.chat_offset())).await.unwrap();
        assert_eq!(offset, Some(3));
    }

    #[test]
    fn test_error_responses() {
        let err = LedgerError::InsufficientBalance {
            balance: Decimal::from(1),
            stake: Decimal::from(2),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_json()["error_code"], "INSUFFICIENT_BALANCE");
        assert_eq!(LedgerError::UnknownUser("x".into()).status_code(), StatusCode::NOT_FOUND);
    }
}
