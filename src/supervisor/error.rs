//! Supervisor errors. Each variant maps to an HTTP status and a stable
//! error code so IPC handlers can return them directly.

use axum::http::StatusCode;

use crate::amount::AmountError;
use crate::protocol::ProtocolError;

/// Failures from spawning, stopping or addressing a client process
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// Client executable or script is not installed
    #[error("Dependency missing: {0}")]
    DependencyMissing(String),

    /// Process exited inside the startup window
    #[error("Client for '{account}' crashed during startup (exit code: {})", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    StartupCrash { account: String, exit_code: Option<i32> },

    #[error("Failed to spawn client: {0}")]
    SpawnFailed(String),

    #[error("No main account credentials configured")]
    MainAccountMissing,

    #[error("'{0}' is the main account; use the main connect/disconnect instead")]
    IsMainAccount(String),

    #[error("Account '{0}' is not configured")]
    UnknownAccount(String),

    #[error("'{0}' is already connected")]
    AlreadyConnected(String),

    #[error("'{0}' is not connected")]
    NotConnected(String),

    #[error(transparent)]
    InvalidAmount(#[from] AmountError),

    #[error("Pay amount must be a whole number above zero, got {0}")]
    InvalidPayAmount(String),

    #[error("Invalid recipient '{0}'")]
    InvalidRecipient(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SupervisorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DependencyMissing(_) | Self::MainAccountMissing => StatusCode::SERVICE_UNAVAILABLE,
            Self::StartupCrash { .. } => StatusCode::BAD_GATEWAY,
            Self::UnknownAccount(_) => StatusCode::NOT_FOUND,
            Self::AlreadyConnected(_) | Self::NotConnected(_) => StatusCode::CONFLICT,
            Self::IsMainAccount(_)
            | Self::InvalidAmount(_)
            | Self::InvalidPayAmount(_)
            | Self::InvalidRecipient(_) => StatusCode::BAD_REQUEST,
            Self::SpawnFailed(_) | Self::Protocol(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }

    /// Machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DependencyMissing(_) => "DEPENDENCY_MISSING",
            Self::StartupCrash { .. } => "STARTUP_CRASH",
            Self::SpawnFailed(_) => "SPAWN_FAILED",
            Self::MainAccountMissing => "MAIN_ACCOUNT_MISSING",
            Self::IsMainAccount(_) => "IS_MAIN_ACCOUNT",
            Self::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            Self::AlreadyConnected(_) => "ALREADY_CONNECTED",
            Self::NotConnected(_) => "NOT_CONNECTED",
            Self::InvalidAmount(_) | Self::InvalidPayAmount(_) => "INVALID_AMOUNT",
            Self::InvalidRecipient(_) => "INVALID_RECIPIENT",
            Self::Protocol(_) => "IO_ERROR",
        }
    }
}

impl axum::response::IntoResponse for SupervisorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}
