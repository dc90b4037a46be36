//! Chat-log scanner: payment notices credit balances, verification
//! whispers promote pending users. Each physical line is evaluated at most
//! once; the consumed offset lives in the ledger and moves in the same write
//! as the change a line caused.

pub mod patterns;
pub mod tail;

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::GlobalConfig;
use crate::ledger::{LedgerError, LedgerStore, SharedLedger};
pub use patterns::{ChatEvent, ChatPatterns};
pub use tail::{LogTail, TailLine, TailRead};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("failed to read chat log: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Outcome of one scan tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub lines: usize,
    pub payments_credited: usize,
    pub verifications: usize,
    /// Pattern-shaped lines that changed nothing
    pub misses: usize,
    /// Log shrank and was re-read from the start
    pub reset: bool,
}

#[derive(Debug, Clone)]
pub struct ChatScanner {
    tail: LogTail,
    patterns: ChatPatterns,
    max_lines: usize,
}

impl ChatScanner {
    pub fn new(log_path: impl Into<PathBuf>, bot_account: &str, max_lines: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            tail: LogTail::new(log_path),
            patterns: ChatPatterns::new(bot_account)?,
            max_lines: max_lines.max(1),
        })
    }

    pub fn from_config(cfg: &GlobalConfig) -> Result<Self, regex::Error> {
        Self::new(cfg.chat_log_path(), &cfg.chat.bot_account, cfg.chat.max_lines_per_tick)
    }

    /// Scan new lines against `store`. The caller must hold exclusive access
    /// to the store for the whole call.
    pub fn scan(&self, store: &mut LedgerStore) -> Result<ScanReport, ChatError> {
        let start = store.chat_offset();
        let read = self.tail.read_from(start, self.max_lines)?;
        let mut report = ScanReport {
            lines: read.lines.len(),
            reset: read.reset,
            ..Default::default()
        };

        if start.is_none() {
            tracing::info!("Chat log scan starting at offset {}", read.next_offset);
            store.advance_offset(read.next_offset);
            return Ok(report);
        }

        for line in &read.lines {
            self.apply(store, line, &mut report)?;
        }
        store.advance_offset(read.next_offset);

        if read.more {
            tracing::debug!("Chat log backlog exceeds {} lines, continuing next tick", self.max_lines);
        }
        Ok(report)
    }

    fn apply(&self, store: &mut LedgerStore, line: &TailLine, report: &mut ScanReport) -> Result<(), ChatError> {
        let offset = Some(line.end_offset);
        match self.patterns.classify(&line.text) {
            Some(ChatEvent::Payment { payer, amount }) => {
                match store.credit_by_game_username(&payer, amount, offset)? {
                    Some(_) => report.payments_credited += 1,
                    None => {
                        tracing::debug!("Payment of ${} from unverified player {} dropped", amount, payer);
                        report.misses += 1;
                    }
                }
            }
            Some(ChatEvent::Verification { sender }) => match store.promote_by_game_username(&sender, offset)? {
                Some(_) => report.verifications += 1,
                None => {
                    tracing::debug!("Verify whisper from {} with no pending verification", sender);
                    report.misses += 1;
                }
            },
            Some(ChatEvent::MalformedPayment { payer, error }) => {
                tracing::debug!("Payment notice from {} ignored: {}", payer, error);
                report.misses += 1;
            }
            None => {}
        }
        Ok(())
    }

    /// One scheduled tick against the shared store.
    pub async fn tick(&self, ledger: &SharedLedger) -> Result<ScanReport, ChatError> {
        let scanner = self.clone();
        ledger.with(move |store| Ok(scanner.scan(store))).await?
    }
}
