pub mod auth;
pub mod handlers;

use anyhow::Result;
use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::GlobalConfig;
use crate::ledger::SharedLedger;
use crate::supervisor::SharedSupervisor;

/// IPC server state shared by every handler.
#[derive(Clone)]
pub struct IpcServer {
    pub supervisor: SharedSupervisor,
    pub ledger: SharedLedger,
    pub token: Arc<String>,
    pub listen_addr: String,
    pub win_probability: f64,
    pub warp_delay: Duration,
    /// Whisper target named in verification instructions
    pub bot_account: String,
}

impl IpcServer {
    pub fn new(cfg: &GlobalConfig, supervisor: SharedSupervisor, ledger: SharedLedger, token: Arc<String>) -> Self {
        Self {
            supervisor,
            ledger,
            token,
            listen_addr: cfg.ipc.listen_addr.clone(),
            win_probability: cfg.win_probability(),
            warp_delay: Duration::from_millis(cfg.client.warp_delay_ms),
            bot_account: cfg.chat.bot_account.clone(),
        }
    }

    pub fn router(&self) -> Router {
        use handlers::{account, afk, ledger};

        let api = Router::new()
            .route("/api/main/connect", post(account::connect_main))
            .route("/api/main/disconnect", post(account::disconnect_main))
            .route("/api/main/status", get(account::main_status))
            .route("/api/pay", post(account::pay))
            .route("/api/output/:account", get(account::recent_output))
            .route("/api/afk/status", get(afk::status))
            .route("/api/afk/connect", post(afk::connect))
            .route("/api/afk/on", post(afk::afk_on))
            .route("/api/afk/disconnect", post(afk::disconnect))
            .route("/api/verify/request", post(ledger::request_verification))
            .route("/api/verify/manual", post(ledger::verify_manual))
            .route("/api/ledger/:id", get(ledger::get_user))
            .route("/api/wager", post(ledger::wager))
            .route("/api/leaderboard", get(ledger::leaderboard))
            .route_layer(middleware::from_fn_with_state(self.token.clone(), auth::auth_middleware));

        Router::new()
            .route("/health", get(health))
            .merge(api)
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("IPC listening on http://{}", self.listen_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        tracing::info!("IPC server stopped");
        Ok(())
    }
}

/// GET /health: unauthenticated liveness probe. Never waits on the
/// supervisor; while a connect or restart holds it, `main_connected` is null.
async fn health(State(state): State<IpcServer>) -> impl IntoResponse {
    let main_connected = match state.supervisor.try_write() {
        Ok(mut sup) => Some(sup.is_main_alive()),
        Err(_) => None,
    };
    let counts = state
        .ledger
        .with(|s| Ok((s.verified_count(), s.pending_count())))
        .await;
    match counts {
        Ok((verified, pending)) => Json(json!({
            "status": "ok",
            "main_connected": main_connected,
            "supervisor_busy": main_connected.is_none(),
            "verified_users": verified,
            "pending_verifications": pending,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountRegistry;
    use crate::ledger::LedgerStore;
    use crate::protocol::FileProtocol;
    use crate::supervisor::{LaunchSpec, Supervisor, SupervisorOptions};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    fn server(dir: &std::path::Path) -> IpcServer {
        let launch = LaunchSpec {
            program: "sh".into(),
            args: vec!["-c".into(), "sleep 30".into(), "client".into()],
            working_dir: dir.to_path_buf(),
            script: None,
        };
        let supervisor = Supervisor::new(
            Arc::new(AccountRegistry::default()),
            FileProtocol::new(dir),
            launch,
            SupervisorOptions::default(),
        );
        let ledger = SharedLedger::new(LedgerStore::load(dir.join("gambling_data.json")).unwrap());
        IpcServer {
            supervisor: Arc::new(RwLock::new(supervisor)),
            ledger,
            token: Arc::new(TOKEN.to_string()),
            listen_addr: "127.0.0.1:0".into(),
            win_probability: 1.0,
            warp_delay: Duration::from_millis(0),
            bot_account: "BotName".into(),
        }
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri).header(auth::TOKEN_HEADER, TOKEN);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 64).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_is_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        let app = server(dir.path()).router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["main_connected"], false);
        assert_eq!(json["verified_users"], 0);
    }

    #[tokio::test]
    async fn test_health_answers_while_supervisor_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let state = server(dir.path());
        let app = state.router();
        let _busy = state.supervisor.write().await;

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = tokio::time::timeout(Duration::from_secs(1), app.oneshot(req))
            .await
            .expect("health must not wait on the supervisor lock")
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["main_connected"], serde_json::Value::Null);
        assert_eq!(json["supervisor_busy"], true);
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = server(dir.path()).router();
        let req = Request::builder().uri("/api/leaderboard").body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/api/leaderboard")
            .header(auth::TOKEN_HEADER, "wrong")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_verification_flow_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let app = server(dir.path()).router();

        let (status, json) = call(
            &app,
            "POST",
            "/api/verify/request",
            Some(json!({"external_id": "1001", "minecraft_username": "Alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["instructions"].as_str().unwrap().contains("verify"));

        let (status, json) = call(&app, "GET", "/api/ledger/1001", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "pending");

        let (status, _) = call(
            &app,
            "POST",
            "/api/verify/manual",
            Some(json!({"external_id": "1001", "minecraft_username": "Alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, json) = call(&app, "GET", "/api/ledger/1001", None).await;
        assert_eq!(json["state"], "verified");
        assert_eq!(json["user"]["minecraft_username"], "Alice");

        let (status, json) = call(&app, "GET", "/api/ledger/9999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error_code"], "UNKNOWN_USER");
    }

    #[tokio::test]
    async fn test_wager_validation_and_settlement() {
        let dir = tempfile::tempdir().unwrap();
        let state = server(dir.path());
        state
            .ledger
            .with(|s| {
                s.verify_manual("1001", "Alice")?;
                s.credit_by_game_username("Alice", rust_decimal::Decimal::from(1_000), None)
                    .map(|_| ())
            })
            .await
            .unwrap();
        let app = state.router();

        let (status, json) = call(&app, "POST", "/api/wager", Some(json!({"external_id": "1001", "amount": "2K"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error_code"], "INSUFFICIENT_BALANCE");

        let (status, json) = call(&app, "POST", "/api/wager", Some(json!({"external_id": "1001", "amount": "abc"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error_code"], "INVALID_AMOUNT");

        // win_probability = 1.0 in the fixture
        let (status, json) = call(&app, "POST", "/api/wager", Some(json!({"external_id": "1001", "amount": "500"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "won");
        assert_eq!(json["balance"], "1500");

        let (_, json) = call(&app, "GET", "/api/leaderboard?limit=5", None).await;
        assert_eq!(json["entries"][0]["minecraft_username"], "Alice");
    }

    #[tokio::test]
    async fn test_account_errors_map_to_status_codes() {
        let dir = tempfile::tempdir().unwrap();
        let app = server(dir.path()).router();

        let (status, json) = call(&app, "POST", "/api/main/connect", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error_code"], "MAIN_ACCOUNT_MISSING");

        let (status, json) = call(&app, "POST", "/api/pay", Some(json!({"recipient": "Bob", "amount": "1M"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error_code"], "NOT_CONNECTED");

        let (status, _) = call(&app, "POST", "/api/pay", Some(json!({"recipient": "Bob", "amount": "lots"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = call(&app, "POST", "/api/afk/connect", Some(json!({"username": "Ghost"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error_code"], "UNKNOWN_ACCOUNT");

        let (status, json) = call(&app, "GET", "/api/output/main", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error_code"], "NOT_CONNECTED");

        let (status, json) = call(&app, "GET", "/api/afk/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["accounts"].as_array().unwrap().is_empty());
    }
}
