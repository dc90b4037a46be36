use rust_decimal::Decimal;
use std::fmt;

use crate::amount::format_plain;

/// In-game slash commands the core issues through command files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameCommand {
    /// `/pay <recipient> <amount>`; amount rendered without separators or suffix
    Pay { recipient: String, amount: Decimal },
    /// `/warp <destination>`
    Warp(String),
}

impl GameCommand {
    pub fn warp_afk() -> Self {
        GameCommand::Warp("afk".to_string())
    }
}

impl fmt::Display for GameCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameCommand::Pay { recipient, amount } => write!(f, "/pay {} {}", recipient, format_plain(*amount)),
            GameCommand::Warp(dest) => write!(f, "/warp {}", dest),
        }
    }
}
