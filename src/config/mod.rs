use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config/global.toml";

/// Daemon configuration, read from `config/global.toml` (or `AUTOPAY_CONFIG`).
/// Every field has a default so an absent file is a valid configuration.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GlobalConfig {
    /// Directory holding the command, status, and chat-log files shared with the client
    pub project_dir: PathBuf,
    pub client: ClientConfig,
    pub chat: ChatConfig,
    pub ledger: LedgerConfig,
    pub supervisor: SupervisorConfig,
    pub wager: WagerConfig,
    pub ipc: IpcConfig,
    pub accounts: AccountSourceConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ClientConfig {
    pub program: String,
    /// Script passed before the `connect` verb; `None` runs `program connect`.
    pub script: Option<PathBuf>,
    pub startup_window_ms: u64,
    pub terminate_grace_secs: u64,
    pub warp_delay_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub log_file: PathBuf,
    /// Name the whisper pattern expects after `->`
    pub bot_account: String,
    pub max_lines_per_tick: usize,
    pub scan_interval_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub file: PathBuf,
    pub snapshot_interval_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SupervisorConfig {
    pub health_check_interval_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WagerConfig {
    pub win_probability: f64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct IpcConfig {
    pub listen_addr: String,
    pub token: Option<String>,
    pub token_file: PathBuf,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AccountSourceConfig {
    /// Structured account list, used when `AFK_ACCOUNTS` is not set
    pub file: PathBuf,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            client: ClientConfig::default(),
            chat: ChatConfig::default(),
            ledger: LedgerConfig::default(),
            supervisor: SupervisorConfig::default(),
            wager: WagerConfig::default(),
            ipc: IpcConfig::default(),
            accounts: AccountSourceConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            script: Some(PathBuf::from("minecraft_client.js")),
            startup_window_ms: 3_000,
            terminate_grace_secs: 5,
            warp_delay_ms: 5_000,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("recent_chat.log"),
            bot_account: "thebestgambler175648".to_string(),
            max_lines_per_tick: 200,
            scan_interval_ms: 1_000,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("gambling_data.json"),
            snapshot_interval_secs: 300,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { health_check_interval_secs: 10 }
    }
}

impl Default for WagerConfig {
    fn default() -> Self {
        Self { win_probability: 0.5 }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:57480".to_string(),
            token: None,
            token_file: PathBuf::from("config/.ipc_token"),
        }
    }
}

impl Default for AccountSourceConfig {
    fn default() -> Self {
        Self { file: PathBuf::from("afk_accounts.json") }
    }
}

impl GlobalConfig {
    /// Load from `AUTOPAY_CONFIG` or the default path. A missing or malformed
    /// file falls back to defaults (logged), never fails startup.
    pub fn load() -> Self {
        let path = std::env::var("AUTOPAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = Self::load_from(Path::new(&path));
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg
    }

    /// Environment overrides, applied on top of the file:
    /// `AUTOPAY_PROJECT_DIR`, `AUTOPAY_LISTEN_ADDR`, `AUTOPAY_IPC_TOKEN`,
    /// `AUTOPAY_BOT_ACCOUNT`, `AUTOPAY_CLIENT_PROGRAM`, `AUTOPAY_WIN_PROBABILITY`.
    /// Empty values are ignored, as is an unparsable probability.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("AUTOPAY_PROJECT_DIR") {
            self.project_dir = PathBuf::from(dir);
        }
        if let Some(addr) = get("AUTOPAY_LISTEN_ADDR") {
            self.ipc.listen_addr = addr;
        }
        if let Some(token) = get("AUTOPAY_IPC_TOKEN") {
            self.ipc.token = Some(token);
        }
        if let Some(bot) = get("AUTOPAY_BOT_ACCOUNT") {
            self.chat.bot_account = bot;
        }
        if let Some(program) = get("AUTOPAY_CLIENT_PROGRAM") {
            self.client.program = program;
        }
        if let Some(raw) = get("AUTOPAY_WIN_PROBABILITY") {
            match raw.trim().parse::<f64>() {
                Ok(p) => self.wager.win_probability = p,
                Err(_) => tracing::warn!("Ignoring AUTOPAY_WIN_PROBABILITY={:?}: not a number", raw),
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                return Self::default();
            }
        };
        match Self::parse(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!("Failed to parse {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve a configured path against `project_dir` unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn chat_log_path(&self) -> PathBuf {
        self.resolve(&self.chat.log_file)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.ledger.file)
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.resolve(&self.accounts.file)
    }

    /// Win probability clamped into `[0, 1]`.
    pub fn win_probability(&self) -> f64 {
        if self.wager.win_probability.is_nan() {
            return 0.0;
        }
        self.wager.win_probability.clamp(0.0, 1.0)
    }
}
