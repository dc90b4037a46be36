use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::super::IpcServer;
use crate::supervisor::{self, AfkResult, SupervisorError};

/// Body of connect/disconnect. Without a username the call applies to
/// every AFK account.
#[derive(Debug, Default, Deserialize)]
pub struct AfkRequest {
    #[serde(default)]
    pub username: Option<String>,
}

fn bulk_response(results: Vec<AfkResult>) -> Json<Value> {
    let succeeded = results.iter().filter(|r| r.success).count();
    Json(json!({
        "success": succeeded == results.len(),
        "succeeded": succeeded,
        "total": results.len(),
        "results": results,
    }))
}

/// GET /api/afk/status
pub async fn status(State(state): State<IpcServer>) -> Json<Value> {
    let accounts: Vec<Value> = state
        .supervisor
        .write()
        .await
        .afk_statuses()
        .into_iter()
        .map(|(username, status)| json!({"username": username, "status": status}))
        .collect();
    Json(json!({
        "success": true,
        "accounts": accounts,
    }))
}

/// POST /api/afk/connect
pub async fn connect(
    State(state): State<IpcServer>,
    payload: Option<Json<AfkRequest>>,
) -> Result<Json<Value>, SupervisorError> {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let mut sup = state.supervisor.write().await;
    match req.username {
        Some(username) => {
            let pid = sup.connect_afk(&username).await?;
            Ok(Json(json!({
                "success": true,
                "message": format!("Connected {}", username),
                "pid": pid,
            })))
        }
        None => Ok(bulk_response(sup.connect_all_afk().await)),
    }
}

/// POST /api/afk/on: connect everything, then `/warp afk` after the delay
pub async fn afk_on(State(state): State<IpcServer>) -> Json<Value> {
    bulk_response(supervisor::afk_on(&state.supervisor, state.warp_delay).await)
}

/// POST /api/afk/disconnect
pub async fn disconnect(
    State(state): State<IpcServer>,
    payload: Option<Json<AfkRequest>>,
) -> Result<Json<Value>, SupervisorError> {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let mut sup = state.supervisor.write().await;
    match req.username {
        Some(username) => {
            sup.disconnect_afk(&username).await?;
            Ok(Json(json!({
                "success": true,
                "message": format!("Disconnected {}", username),
            })))
        }
        None => Ok(bulk_response(sup.disconnect_all_afk().await)),
    }
}
