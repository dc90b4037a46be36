//! Periodic background jobs: chat scan, main-process health check, ledger
//! snapshot. Each runs on its own interval and stops when the token is
//! cancelled.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatScanner;
use crate::config::GlobalConfig;
use crate::ledger::SharedLedger;
use crate::supervisor::{HealthOutcome, SharedSupervisor};

/// Repeated failures are logged on the first three and then every tenth.
struct ErrorThrottle {
    count: u64,
}

impl ErrorThrottle {
    fn new() -> Self {
        Self { count: 0 }
    }

    fn failed(&mut self) -> bool {
        self.count += 1;
        self.count <= 3 || self.count % 10 == 0
    }

    fn recovered(&mut self) -> Option<u64> {
        let previous = std::mem::take(&mut self.count);
        (previous > 0).then_some(previous)
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(10)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

pub async fn chat_scan_loop(scanner: ChatScanner, ledger: SharedLedger, period: Duration, cancel: CancellationToken) {
    let mut interval = ticker(period);
    let mut errors = ErrorThrottle::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        match scanner.tick(&ledger).await {
            Ok(report) => {
                if let Some(n) = errors.recovered() {
                    tracing::info!("Chat scan recovered after {} errors", n);
                }
                if report.payments_credited + report.verifications > 0 {
                    tracing::info!(
                        "Chat scan: {} lines, {} payments credited, {} verifications",
                        report.lines,
                        report.payments_credited,
                        report.verifications
                    );
                }
            }
            Err(e) => {
                if errors.failed() {
                    tracing::error!("Chat scan error (count: {}): {}", errors.count, e);
                }
            }
        }
    }
    tracing::debug!("Chat scan loop stopped");
}

pub async fn health_check_loop(supervisor: SharedSupervisor, period: Duration, cancel: CancellationToken) {
    let mut interval = ticker(period);
    // first tick fires immediately; nothing is running yet
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let outcome = supervisor.write().await.health_check().await;
        if outcome == HealthOutcome::RestartFailed {
            tracing::warn!("Main client is down; retrying in {:?}", period);
        }
    }
    tracing::debug!("Health check loop stopped");
}

pub async fn snapshot_loop(ledger: SharedLedger, period: Duration, cancel: CancellationToken) {
    let mut interval = ticker(period);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        match ledger.snapshot().await {
            Ok(true) => tracing::debug!("Periodic ledger snapshot written"),
            Ok(false) => {}
            Err(e) => tracing::error!("Periodic ledger snapshot failed: {}", e),
        }
    }
    tracing::debug!("Snapshot loop stopped");
}

/// Handles of the running jobs.
pub struct Jobs {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Jobs {
    pub fn start(cfg: &GlobalConfig, scanner: ChatScanner, ledger: SharedLedger, supervisor: SharedSupervisor) -> Self {
        let cancel = CancellationToken::new();
        let handles = vec![
            tokio::spawn(chat_scan_loop(
                scanner,
                ledger.clone(),
                Duration::from_millis(cfg.chat.scan_interval_ms),
                cancel.child_token(),
            )),
            tokio::spawn(health_check_loop(
                supervisor,
                Duration::from_secs(cfg.supervisor.health_check_interval_secs),
                cancel.child_token(),
            )),
            tokio::spawn(snapshot_loop(
                ledger,
                Duration::from_secs(cfg.ledger.snapshot_interval_secs),
                cancel.child_token(),
            )),
        ];
        tracing::info!("Background jobs started");
        Self { cancel, handles }
    }

    /// Cancel every job and wait for them to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Background job ended abnormally: {}", e);
            }
        }
    }
}
