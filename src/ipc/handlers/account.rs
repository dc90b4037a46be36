use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::super::IpcServer;
use crate::accounts::AccountKey;
use crate::supervisor::SupervisorError;

#[derive(Debug, Deserialize)]
pub struct OutputQuery {
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub recipient: String,
    /// Shared amount syntax: `1500000`, `1.5M`, `10,000`
    pub amount: String,
}

/// POST /api/main/connect
pub async fn connect_main(State(state): State<IpcServer>) -> Result<Json<Value>, SupervisorError> {
    let pid = state.supervisor.write().await.connect_main().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Main account connected",
        "pid": pid,
    })))
}

/// POST /api/main/disconnect
pub async fn disconnect_main(State(state): State<IpcServer>) -> Result<Json<Value>, SupervisorError> {
    state.supervisor.write().await.disconnect_main().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Main account disconnected",
    })))
}

/// GET /api/main/status
pub async fn main_status(State(state): State<IpcServer>) -> Json<Value> {
    let status = state.supervisor.write().await.main_status();
    Json(json!({
        "success": true,
        "status": status,
    }))
}

/// POST /api/pay: write `/pay <recipient> <amount>` for the main client.
/// The receipt only means the command reached the command file.
pub async fn pay(
    State(state): State<IpcServer>,
    Json(req): Json<PayRequest>,
) -> Result<Json<Value>, SupervisorError> {
    let dispatch = state.supervisor.write().await.pay(&req.recipient, &req.amount)?;
    Ok(Json(json!({
        "success": true,
        "dispatch": dispatch,
    })))
}

/// GET /api/output/:account?count=N, where account is `main` or an AFK username
pub async fn recent_output(
    State(state): State<IpcServer>,
    Path(account): Path<String>,
    Query(query): Query<OutputQuery>,
) -> Result<Json<Value>, SupervisorError> {
    let sup = state.supervisor.read().await;
    let key = if account.eq_ignore_ascii_case("main") {
        AccountKey::Main
    } else {
        let canonical = sup
            .registry()
            .find_afk(&account)
            .map(|a| a.username.clone())
            .ok_or_else(|| SupervisorError::UnknownAccount(account.clone()))?;
        AccountKey::Afk(canonical)
    };
    let lines = sup
        .recent_output(&key, query.count)
        .ok_or_else(|| SupervisorError::NotConnected(key.to_string()))?;
    Ok(Json(json!({
        "success": true,
        "account": key.to_string(),
        "lines": lines,
    })))
}
