//! Account registry: one main account plus any number of AFK accounts.
//!
//! Two input shapes are accepted and normalized into [`AccountConfig`]:
//! - structured: `afk_accounts.json` with `main_account` / `afk_accounts` records
//! - compact: `AFK_ACCOUNTS` (JSON username → password map) plus shared
//!   `AFK_*` connection defaults that fall back to the main account's values

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

// Environment contract of the external client binary.
pub const ENV_HOST: &str = "MINECRAFT_HOST";
pub const ENV_PORT: &str = "MINECRAFT_PORT";
pub const ENV_USERNAME: &str = "MINECRAFT_USERNAME";
pub const ENV_PASSWORD: &str = "MINECRAFT_PASSWORD";
pub const ENV_TYPE: &str = "MINECRAFT_TYPE";
pub const ENV_VERSION: &str = "MINECRAFT_VERSION";
pub const ENV_AUTH: &str = "AUTH_TYPE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read account file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed account JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid port '{value}' in {var}")]
    InvalidPort { var: String, value: String },
}

/// Connection parameters for one game account. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub client_type: String,
    pub protocol_version: String,
    pub auth_mode: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_type", &self.client_type)
            .field("protocol_version", &self.protocol_version)
            .field("auth_mode", &self.auth_mode)
            .finish()
    }
}

impl AccountConfig {
    /// Environment handed to the client process. The binary is a pure
    /// function of these variables plus the `connect` verb.
    pub fn environment(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_HOST, self.host.clone()),
            (ENV_PORT, self.port.to_string()),
            (ENV_USERNAME, self.username.clone()),
            (ENV_PASSWORD, self.password.clone()),
            (ENV_TYPE, self.client_type.clone()),
            (ENV_VERSION, self.protocol_version.clone()),
            (ENV_AUTH, self.auth_mode.clone()),
        ]
    }
}

/// Identity of a supervised account: the main account or an AFK username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccountKey {
    Main,
    Afk(String),
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKey::Main => write!(f, "main"),
            AccountKey::Afk(name) => write!(f, "afk:{}", name),
        }
    }
}

/// Shared connection defaults for the compact account shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDefaults {
    pub host: String,
    pub port: u16,
    pub client_type: String,
    pub protocol_version: String,
    pub auth_mode: String,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25565,
            client_type: "java".to_string(),
            protocol_version: "1.21.70".to_string(),
            auth_mode: "microsoft".to_string(),
        }
    }
}

impl ConnectionDefaults {
    fn account(&self, username: &str, password: &str) -> AccountConfig {
        AccountConfig {
            username: username.to_string(),
            password: password.to_string(),
            host: self.host.clone(),
            port: self.port,
            client_type: self.client_type.clone(),
            protocol_version: self.protocol_version.clone(),
            auth_mode: self.auth_mode.clone(),
        }
    }
}

/// One record of the structured `afk_accounts.json` file.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct AccountRecord {
    pub minecraft_username: Option<String>,
    pub minecraft_password: Option<String>,
    pub minecraft_host: Option<String>,
    pub minecraft_port: Option<u16>,
    pub minecraft_type: Option<String>,
    pub minecraft_version: Option<String>,
    pub minecraft_authtype: Option<String>,
}

impl AccountRecord {
    /// `None` when username or password is missing or blank.
    fn into_config(self, defaults: &ConnectionDefaults) -> Option<AccountConfig> {
        let username = self.minecraft_username.filter(|u| !u.trim().is_empty())?;
        let password = self.minecraft_password.filter(|p| !p.is_empty())?;
        Some(AccountConfig {
            username,
            password,
            host: self.minecraft_host.unwrap_or_else(|| defaults.host.clone()),
            port: self.minecraft_port.unwrap_or(defaults.port),
            client_type: self.minecraft_type.unwrap_or_else(|| defaults.client_type.clone()),
            protocol_version: self
                .minecraft_version
                .unwrap_or_else(|| defaults.protocol_version.clone()),
            auth_mode: self.minecraft_authtype.unwrap_or_else(|| defaults.auth_mode.clone()),
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AccountFile {
    #[serde(default)]
    pub main_account: Option<AccountRecord>,
    #[serde(default)]
    pub afk_accounts: Vec<AccountRecord>,
}

/// Raw account configuration before normalization.
#[derive(Debug, Clone)]
pub enum AccountSource {
    Structured(AccountFile),
    Compact {
        accounts: BTreeMap<String, String>,
        defaults: ConnectionDefaults,
    },
}

impl AccountSource {
    pub fn empty() -> Self {
        AccountSource::Structured(AccountFile::default())
    }
}

/// Normalized account set. Immutable after load.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    main: Option<AccountConfig>,
    afk: Vec<AccountConfig>,
}

impl AccountRegistry {
    /// Normalize a source. `env_main` is the main account from the
    /// `MINECRAFT_*` variables; a structured file's `main_account` takes
    /// precedence when it carries credentials.
    ///
    /// AFK entries naming the main account are skipped, as are repeated
    /// usernames. Neither is an error.
    pub fn from_source(env_main: Option<AccountConfig>, source: AccountSource) -> Self {
        let fallback = env_main
            .as_ref()
            .map(|m| ConnectionDefaults {
                host: m.host.clone(),
                port: m.port,
                client_type: m.client_type.clone(),
                protocol_version: m.protocol_version.clone(),
                auth_mode: m.auth_mode.clone(),
            })
            .unwrap_or_default();

        let (main, candidates) = match source {
            AccountSource::Structured(file) => {
                let main = file
                    .main_account
                    .and_then(|r| r.into_config(&fallback))
                    .or(env_main);
                let mut candidates = Vec::with_capacity(file.afk_accounts.len());
                for (index, record) in file.afk_accounts.into_iter().enumerate() {
                    match record.into_config(&fallback) {
                        Some(account) => candidates.push(account),
                        None => tracing::warn!("Skipping AFK account record #{}: missing username or password", index),
                    }
                }
                (main, candidates)
            }
            AccountSource::Compact { accounts, defaults } => {
                let candidates = accounts
                    .iter()
                    .map(|(username, password)| defaults.account(username, password))
                    .collect();
                (env_main, candidates)
            }
        };

        let mut registry = Self { main, afk: Vec::new() };
        for account in candidates {
            if registry.is_main(&account.username) {
                tracing::info!("Skipping AFK entry '{}': is main account", account.username);
                continue;
            }
            if registry.find_afk(&account.username).is_some() {
                tracing::warn!("Skipping duplicate AFK entry '{}'", account.username);
                continue;
            }
            registry.afk.push(account);
        }
        registry
    }

    /// Build the registry from process environment and the structured file.
    /// Malformed input falls back to an empty AFK set and is logged.
    pub fn load(lookup: impl Fn(&str) -> Option<String>, accounts_file: &Path) -> Self {
        let env_main = match main_from_env(&lookup) {
            Ok(main) => main,
            Err(e) => {
                tracing::error!("Main account configuration invalid: {}", e);
                None
            }
        };
        if env_main.is_none() {
            tracing::warn!("No main account credentials configured; Minecraft features are disabled");
        }

        let source = match afk_source(&lookup, accounts_file, env_main.as_ref()) {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("Failed to load AFK accounts configuration: {}", e);
                AccountSource::empty()
            }
        };

        let registry = Self::from_source(env_main, source);
        tracing::info!("Loaded {} AFK accounts", registry.afk.len());
        registry
    }

    pub fn main(&self) -> Option<&AccountConfig> {
        self.main.as_ref()
    }

    pub fn afk_accounts(&self) -> &[AccountConfig] {
        &self.afk
    }

    pub fn find_afk(&self, username: &str) -> Option<&AccountConfig> {
        self.afk.iter().find(|a| a.username.eq_ignore_ascii_case(username))
    }

    /// Game usernames are case-insensitive.
    pub fn is_main(&self, username: &str) -> bool {
        self.main
            .as_ref()
            .is_some_and(|m| m.username.eq_ignore_ascii_case(username))
    }
}

fn parse_port(var: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidPort {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Main account from `MINECRAFT_*` variables; `None` without credentials.
pub fn main_from_env(lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<AccountConfig>, ConfigError> {
    let defaults = ConnectionDefaults::default();
    let port = match lookup(ENV_PORT) {
        Some(v) => parse_port(ENV_PORT, &v)?,
        None => defaults.port,
    };
    let username = lookup(ENV_USERNAME).filter(|u| !u.trim().is_empty());
    let password = lookup(ENV_PASSWORD).filter(|p| !p.is_empty());
    let (Some(username), Some(password)) = (username, password) else {
        return Ok(None);
    };

    Ok(Some(AccountConfig {
        username,
        password,
        host: lookup(ENV_HOST).unwrap_or(defaults.host),
        port,
        client_type: lookup(ENV_TYPE)
            .map(|t| t.to_lowercase())
            .unwrap_or(defaults.client_type),
        protocol_version: lookup(ENV_VERSION).unwrap_or(defaults.protocol_version),
        auth_mode: lookup(ENV_AUTH).unwrap_or(defaults.auth_mode),
    }))
}

/// Pick the AFK account shape: `AFK_ACCOUNTS` wins over the structured file.
pub fn afk_source(
    lookup: &impl Fn(&str) -> Option<String>,
    accounts_file: &Path,
    main: Option<&AccountConfig>,
) -> Result<AccountSource, ConfigError> {
    if let Some(raw) = lookup("AFK_ACCOUNTS") {
        let accounts: BTreeMap<String, String> = serde_json::from_str(&raw)?;
        let base = ConnectionDefaults::default();
        let mut defaults = match main {
            Some(m) => ConnectionDefaults {
                host: m.host.clone(),
                port: m.port,
                client_type: m.client_type.clone(),
                protocol_version: m.protocol_version.clone(),
                auth_mode: m.auth_mode.clone(),
            },
            None => base,
        };
        if let Some(host) = lookup("AFK_HOST") {
            defaults.host = host;
        }
        if let Some(port) = lookup("AFK_PORT") {
            defaults.port = parse_port("AFK_PORT", &port)?;
        }
        if let Some(t) = lookup("AFK_TYPE") {
            defaults.client_type = t;
        }
        if let Some(v) = lookup("AFK_VERSION") {
            defaults.protocol_version = v;
        }
        if let Some(a) = lookup("AFK_AUTH") {
            defaults.auth_mode = a;
        }
        return Ok(AccountSource::Compact { accounts, defaults });
    }

    if !accounts_file.exists() {
        tracing::info!("No AFK account source (neither AFK_ACCOUNTS nor {})", accounts_file.display());
        return Ok(AccountSource::empty());
    }
    let content = std::fs::read_to_string(accounts_file).map_err(|source| ConfigError::Io {
        path: accounts_file.display().to_string(),
        source,
    })?;
    let file: AccountFile = serde_json::from_str(&content)?;
    Ok(AccountSource::Structured(file))
}
