//! IPC token authentication.
//!
//! The token comes from `ipc.token` in the config or is generated at startup
//! and written to `ipc.token_file`, which the chat-bot process reads. Every
//! `/api` request must carry it in the `X-Autopay-Token` header.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::path::Path;
use std::sync::Arc;

use crate::config::IpcConfig;

pub const TOKEN_HEADER: &str = "X-Autopay-Token";

/// Use the configured token, or generate one and save it for the bot.
pub fn resolve_token(cfg: &IpcConfig) -> anyhow::Result<Arc<String>> {
    if let Some(token) = cfg.token.as_ref().filter(|t| !t.trim().is_empty()) {
        tracing::info!("Using IPC auth token from config");
        return Ok(Arc::new(token.trim().to_string()));
    }
    generate_and_save_token(&cfg.token_file)
}

pub fn generate_and_save_token(path: &Path) -> anyhow::Result<Arc<String>> {
    let token = uuid::Uuid::new_v4().to_string();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &token)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("IPC auth token generated (token: {}…) and saved to {}", &token[..8], path.display());
    Ok(Arc::new(token))
}

// Warn at most once per 30s on repeated auth failures.
static AUTH_FAIL_LAST_LOG: std::sync::Mutex<Option<std::time::Instant>> = std::sync::Mutex::new(None);
static AUTH_FAIL_SUPPRESSED: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

fn hint(token: &str) -> &str {
    if token.is_empty() {
        "(empty)"
    } else {
        token.get(..8).unwrap_or(token)
    }
}

pub async fn auth_middleware(
    State(expected): State<Arc<String>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == expected.as_str() {
        return Ok(next.run(req).await);
    }

    let should_log = {
        let mut last = AUTH_FAIL_LAST_LOG.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(t) if t.elapsed().as_secs() < 30 => false,
            _ => {
                *last = Some(std::time::Instant::now());
                true
            }
        }
    };
    if should_log {
        let suppressed = AUTH_FAIL_SUPPRESSED.swap(0, std::sync::atomic::Ordering::Relaxed);
        tracing::warn!(
            "IPC auth failed for {}: got={}… (suppressed {} previous)",
            req.uri(),
            hint(provided),
            suppressed
        );
    } else {
        AUTH_FAIL_SUPPRESSED.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_configured_token_wins() {
        let cfg = IpcConfig {
            token: Some(" secret ".into()),
            token_file: PathBuf::from("/nonexistent/should/not/be/written"),
            ..Default::default()
        };
        assert_eq!(resolve_token(&cfg).unwrap().as_str(), "secret");
    }

    #[test]
    fn test_generated_token_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".ipc_token");
        let cfg = IpcConfig {
            token: None,
            token_file: path.clone(),
            ..Default::default()
        };
        let token = resolve_token(&cfg).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), *token);
        assert_eq!(token.len(), 36);
    }

    #[test]
    fn test_hint_is_truncated() {
        assert_eq!(hint(""), "(empty)");
        assert_eq!(hint("abc"), "abc");
        assert_eq!(hint("0123456789"), "01234567");
    }
}
