use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::super::IpcServer;
use crate::amount::parse_amount;
use crate::ledger::{wager, LedgerError};

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub external_id: String,
    pub minecraft_username: String,
}

#[derive(Debug, Deserialize)]
pub struct WagerRequest {
    pub external_id: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// POST /api/verify/request
pub async fn request_verification(
    State(state): State<IpcServer>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Value>, LedgerError> {
    let username = req.minecraft_username.trim().to_string();
    let pending = state
        .ledger
        .with(move |s| s.register_pending(&req.external_id, &username))
        .await?;
    Ok(Json(json!({
        "success": true,
        "pending": pending,
        "instructions": format!("/w {} verify", state.bot_account),
    })))
}

/// POST /api/verify/manual (admin)
pub async fn verify_manual(
    State(state): State<IpcServer>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Value>, LedgerError> {
    let username = req.minecraft_username.trim().to_string();
    let user = state
        .ledger
        .with(move |s| s.verify_manual(&req.external_id, &username))
        .await?;
    Ok(Json(json!({
        "success": true,
        "user": user,
    })))
}

/// GET /api/ledger/:id
pub async fn get_user(State(state): State<IpcServer>, Path(id): Path<String>) -> Result<Json<Value>, LedgerError> {
    let body = state
        .ledger
        .with(move |s| {
            if let Some(user) = s.get(&id) {
                return Ok(json!({"success": true, "state": "verified", "user": user}));
            }
            match s.pending(&id) {
                Some(pending) => Ok(json!({"success": true, "state": "pending", "pending": pending})),
                None => Err(LedgerError::UnknownUser(id)),
            }
        })
        .await?;
    Ok(Json(body))
}

/// POST /api/wager
pub async fn wager(State(state): State<IpcServer>, Json(req): Json<WagerRequest>) -> Result<Json<Value>, LedgerError> {
    let stake = parse_amount(&req.amount)?;
    let p = state.win_probability;
    let result = state
        .ledger
        .with(move |s| s.settle_wager(&req.external_id, stake, || wager::draw(p)))
        .await?;
    Ok(Json(json!({
        "success": true,
        "outcome": result.outcome,
        "stake": result.stake,
        "balance": result.balance,
    })))
}

/// GET /api/leaderboard?limit=N
pub async fn leaderboard(
    State(state): State<IpcServer>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Value>, LedgerError> {
    let entries = state.ledger.with(move |s| Ok(s.leaderboard(query.limit))).await?;
    Ok(Json(json!({
        "success": true,
        "entries": entries,
    })))
}
