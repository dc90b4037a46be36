pub mod error;
pub mod managed_process;
pub mod process;

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::accounts::{AccountConfig, AccountKey, AccountRegistry};
use crate::amount::parse_amount;
use crate::protocol::{Dispatch, FileProtocol, GameCommand, StatusRecord};
pub use error::SupervisorError;
pub use managed_process::{LaunchSpec, ManagedProcess, OutputLine, OutputStream};

/// Supervisor timing knobs.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// A process that exits within this window is a startup crash
    pub startup_window: Duration,
    pub terminate_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            startup_window: Duration::from_secs(3),
            terminate_grace: Duration::from_secs(5),
        }
    }
}

impl SupervisorOptions {
    pub fn from_config(cfg: &crate::config::GlobalConfig) -> Self {
        Self {
            startup_window: Duration::from_millis(cfg.client.startup_window_ms),
            terminate_grace: Duration::from_secs(cfg.client.terminate_grace_secs),
        }
    }
}

/// Connection state of one account as seen by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AccountStatus {
    Connected { pid: u32, uptime_secs: u64 },
    /// Process ended on its own; AFK accounts stay here until reconnected
    Exited { exit_code: Option<i32> },
    Disconnected,
    /// Name belongs to the main account
    MainAccount,
}

#[derive(Debug, Clone, Serialize)]
pub struct MainStatus {
    pub username: Option<String>,
    pub process: AccountStatus,
    /// Client-written status file, if readable
    pub client_status: Option<StatusRecord>,
}

/// Outcome of one account in a bulk AFK operation.
#[derive(Debug, Clone, Serialize)]
pub struct AfkResult {
    pub username: String,
    pub success: bool,
    pub message: String,
}

/// Result of a health-check pass over the primary process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Main is not supposed to be running
    Idle,
    Healthy,
    Restarted,
    RestartFailed,
}

pub type SharedSupervisor = Arc<RwLock<Supervisor>>;

/// Owns every client process. At most one live process per account.
pub struct Supervisor {
    registry: Arc<AccountRegistry>,
    protocol: FileProtocol,
    launch: LaunchSpec,
    options: SupervisorOptions,
    processes: HashMap<AccountKey, ManagedProcess>,
    /// Set by a successful main connect, cleared by main disconnect; drives auto-restart
    main_wanted: bool,
}

impl Supervisor {
    pub fn new(
        registry: Arc<AccountRegistry>,
        protocol: FileProtocol,
        launch: LaunchSpec,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            registry,
            protocol,
            launch,
            options,
            processes: HashMap::new(),
            main_wanted: false,
        }
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn protocol(&self) -> &FileProtocol {
        &self.protocol
    }

    /// Remove per-account artifacts left by a previous run.
    pub fn initialize(&self) {
        self.protocol
            .cleanup_stale_status_files(self.registry.afk_accounts().iter().map(|a| a.username.as_str()));
    }

    fn account_for(&self, key: &AccountKey) -> Result<AccountConfig, SupervisorError> {
        match key {
            AccountKey::Main => self.registry.main().cloned().ok_or(SupervisorError::MainAccountMissing),
            AccountKey::Afk(username) => self
                .registry
                .find_afk(username)
                .cloned()
                .ok_or_else(|| SupervisorError::UnknownAccount(username.clone())),
        }
    }

    /// Spawn the client for `key`, replacing any previous process for the
    /// same account. The old process is fully terminated before the new one
    /// starts.
    pub async fn spawn(&mut self, key: AccountKey) -> Result<&ManagedProcess, SupervisorError> {
        let account = self.account_for(&key)?;

        if let Some(mut previous) = self.processes.remove(&key) {
            tracing::info!("[{}] Replacing existing client (pid: {})", key, previous.pid);
            previous.terminate(self.options.terminate_grace).await;
        }
        // a fresh client starts polling an empty command slot
        self.protocol.cleanup(&key)?;

        tracing::info!(
            "[{}] Connecting to {} server at {}:{} as {}",
            key,
            account.client_type,
            account.host,
            account.port,
            account.username
        );
        let mut process = ManagedProcess::spawn(&self.launch, key.clone(), &account)?;

        tokio::time::sleep(self.options.startup_window).await;
        if !process.is_alive() {
            let exit_code = process.exit_code();
            process.terminate(self.options.terminate_grace).await;
            tracing::error!("[{}] Client failed to start (exit code: {:?})", key, exit_code);
            return Err(SupervisorError::StartupCrash {
                account: key.to_string(),
                exit_code,
            });
        }

        Ok(self.processes.entry(key).or_insert(process))
    }

    fn status_of(&mut self, key: &AccountKey) -> AccountStatus {
        let Some(proc) = self.processes.get_mut(key) else {
            return AccountStatus::Disconnected;
        };
        if proc.is_alive() {
            AccountStatus::Connected {
                pid: proc.pid,
                uptime_secs: proc.uptime_secs(),
            }
        } else {
            AccountStatus::Exited {
                exit_code: proc.exit_code(),
            }
        }
    }

    fn is_alive(&mut self, key: &AccountKey) -> bool {
        self.processes.get_mut(key).is_some_and(|p| p.is_alive())
    }

    /// Drop the handle for `key`, terminating it. `false` when none existed.
    async fn teardown(&mut self, key: &AccountKey) -> Result<bool, SupervisorError> {
        let existed = match self.processes.remove(key) {
            Some(mut proc) => {
                proc.terminate(self.options.terminate_grace).await;
                true
            }
            None => false,
        };
        self.protocol.cleanup(key)?;
        Ok(existed)
    }

    // ─── Main account ────────────────────────────────────────

    pub async fn connect_main(&mut self) -> Result<u32, SupervisorError> {
        if self.is_alive(&AccountKey::Main) {
            return Err(SupervisorError::AlreadyConnected("main".to_string()));
        }
        let pid = self.spawn(AccountKey::Main).await?.pid;
        self.main_wanted = true;
        tracing::info!("Successfully connected main account");
        Ok(pid)
    }

    pub async fn disconnect_main(&mut self) -> Result<(), SupervisorError> {
        self.main_wanted = false;
        if self.teardown(&AccountKey::Main).await? {
            tracing::info!("Disconnected main account");
            Ok(())
        } else {
            Err(SupervisorError::NotConnected("main".to_string()))
        }
    }

    pub fn is_main_alive(&mut self) -> bool {
        self.is_alive(&AccountKey::Main)
    }

    pub fn main_status(&mut self) -> MainStatus {
        MainStatus {
            username: self.registry.main().map(|m| m.username.clone()),
            process: self.status_of(&AccountKey::Main),
            client_status: self.protocol.read_status(),
        }
    }

    /// Write `/pay <recipient> <amount>` to the main command file.
    pub fn pay(&mut self, recipient: &str, amount: &str) -> Result<Dispatch, SupervisorError> {
        let recipient = recipient.trim();
        if recipient.is_empty() || !recipient.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SupervisorError::InvalidRecipient(recipient.to_string()));
        }
        let amount = parse_amount(amount)?;
        if amount <= Decimal::ZERO || !amount.fract().is_zero() {
            return Err(SupervisorError::InvalidPayAmount(amount.to_string()));
        }
        if !self.is_main_alive() {
            return Err(SupervisorError::NotConnected("main".to_string()));
        }
        let command = GameCommand::Pay {
            recipient: recipient.to_string(),
            amount,
        };
        Ok(self.protocol.send(&AccountKey::Main, &command)?)
    }

    /// Restart the primary process if it should be running but is not.
    /// AFK workers are never restarted here.
    pub async fn health_check(&mut self) -> HealthOutcome {
        if !self.main_wanted {
            return HealthOutcome::Idle;
        }
        if self.is_main_alive() {
            return HealthOutcome::Healthy;
        }

        let exit_code = self.processes.get(&AccountKey::Main).and_then(|p| p.exit_code());
        tracing::warn!("Main client process died (exit code: {:?}), restarting", exit_code);
        match self.spawn(AccountKey::Main).await {
            Ok(proc) => {
                tracing::info!("Main client restarted (pid: {})", proc.pid);
                HealthOutcome::Restarted
            }
            Err(e) => {
                tracing::error!("Failed to restart main client: {}", e);
                HealthOutcome::RestartFailed
            }
        }
    }

    // ─── AFK accounts ────────────────────────────────────────

    pub async fn connect_afk(&mut self, username: &str) -> Result<u32, SupervisorError> {
        if self.registry.is_main(username) {
            tracing::info!("Skipping main account {} - use main connect instead", username);
            return Err(SupervisorError::IsMainAccount(username.to_string()));
        }
        let canonical = self
            .registry
            .find_afk(username)
            .map(|a| a.username.clone())
            .ok_or_else(|| SupervisorError::UnknownAccount(username.to_string()))?;
        let pid = self.spawn(AccountKey::Afk(canonical.clone())).await?.pid;
        tracing::info!("Successfully connected AFK account: {}", canonical);
        Ok(pid)
    }

    pub async fn disconnect_afk(&mut self, username: &str) -> Result<(), SupervisorError> {
        if self.registry.is_main(username) {
            return Err(SupervisorError::IsMainAccount(username.to_string()));
        }
        let canonical = self
            .registry
            .find_afk(username)
            .map(|a| a.username.clone())
            .ok_or_else(|| SupervisorError::UnknownAccount(username.to_string()))?;
        if self.teardown(&AccountKey::Afk(canonical.clone())).await? {
            tracing::info!("Disconnected AFK account: {}", canonical);
            Ok(())
        } else {
            Err(SupervisorError::NotConnected(canonical))
        }
    }

    pub fn afk_status(&mut self, username: &str) -> AccountStatus {
        if self.registry.is_main(username) {
            return AccountStatus::MainAccount;
        }
        match self.registry.find_afk(username).map(|a| a.username.clone()) {
            Some(canonical) => self.status_of(&AccountKey::Afk(canonical)),
            None => AccountStatus::Disconnected,
        }
    }

    pub fn afk_statuses(&mut self) -> Vec<(String, AccountStatus)> {
        let names: Vec<String> = self.afk_usernames();
        names
            .into_iter()
            .map(|name| {
                let status = self.status_of(&AccountKey::Afk(name.clone()));
                (name, status)
            })
            .collect()
    }

    fn afk_usernames(&self) -> Vec<String> {
        self.registry.afk_accounts().iter().map(|a| a.username.clone()).collect()
    }

    pub async fn connect_all_afk(&mut self) -> Vec<AfkResult> {
        let mut results = Vec::new();
        for username in self.afk_usernames() {
            let result = match self.connect_afk(&username).await {
                Ok(_) => AfkResult {
                    message: format!("Connected {}", username),
                    username,
                    success: true,
                },
                Err(e) => AfkResult {
                    message: e.to_string(),
                    username,
                    success: false,
                },
            };
            results.push(result);
        }
        results
    }

    pub async fn disconnect_all_afk(&mut self) -> Vec<AfkResult> {
        let mut results = Vec::new();
        for username in self.afk_usernames() {
            let result = match self.disconnect_afk(&username).await {
                Ok(()) => AfkResult {
                    message: format!("Disconnected {}", username),
                    username,
                    success: true,
                },
                Err(e) => AfkResult {
                    message: e.to_string(),
                    username,
                    success: false,
                },
            };
            results.push(result);
        }
        results
    }

    /// Write a command for an AFK account. The account must be alive.
    pub fn send_afk(&mut self, username: &str, command: &GameCommand) -> Result<Dispatch, SupervisorError> {
        let key = AccountKey::Afk(username.to_string());
        if !self.is_alive(&key) {
            return Err(SupervisorError::NotConnected(username.to_string()));
        }
        Ok(self.protocol.send(&key, command)?)
    }

    /// Recent drained output for one account.
    pub fn recent_output(&self, key: &AccountKey, count: usize) -> Option<Vec<OutputLine>> {
        self.processes.get(key).map(|p| p.recent_output(count))
    }

    pub fn live_count(&mut self) -> usize {
        self.processes.values_mut().map(|p| p.is_alive()).filter(|alive| *alive).count()
    }

    /// Terminate every process and remove their command files.
    pub async fn shutdown(&mut self) {
        self.main_wanted = false;
        let keys: Vec<AccountKey> = self.processes.keys().cloned().collect();
        for key in keys {
            if let Err(e) = self.teardown(&key).await {
                tracing::warn!("[{}] Cleanup failed during shutdown: {}", key, e);
            }
        }
        tracing::info!("All client processes stopped");
    }
}

/// Connect every AFK account, then send `/warp afk` to each one that came
/// up once `warp_delay` has passed. The lock is not held during the wait.
pub async fn afk_on(supervisor: &SharedSupervisor, warp_delay: Duration) -> Vec<AfkResult> {
    let mut results = supervisor.write().await.connect_all_afk().await;
    if !results.iter().any(|r| r.success) {
        return results;
    }

    tokio::time::sleep(warp_delay).await;
    let warp = GameCommand::warp_afk();
    let mut sup = supervisor.write().await;
    for result in results.iter_mut().filter(|r| r.success) {
        match sup.send_afk(&result.username, &warp) {
            Ok(_) => result.message = format!("Connected {} and sent {}", result.username, warp),
            Err(e) => {
                tracing::warn!("[afk:{}] Warp command not sent: {}", result.username, e);
                result.success = false;
                result.message = e.to_string();
            }
        }
    }
    results
}
