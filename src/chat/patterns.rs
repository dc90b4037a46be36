use regex::Regex;
use rust_decimal::Decimal;

use crate::amount::{parse_amount, AmountError};

/// Optional `[hh:mm:ss] ` stamp the client puts in front of each line.
/// Both patterns are anchored at line start.
const LINE_PREFIX: &str = r"^(?:\[[^\]]*\]\s*)?";

/// `<payer> paid you $<amount><suffix?>`
const PAYMENT_PATTERN: &str = r"(\w+) paid you \$([0-9][0-9,.]*[KkMmBbTt]?)";

/// A chat line classified against the two protocol patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Payment { payer: String, amount: Decimal },
    Verification { sender: String },
    /// Resembles a payment but the amount does not parse
    MalformedPayment { payer: String, error: AmountError },
}

/// Compiled patterns for one bot account name.
#[derive(Debug, Clone)]
pub struct ChatPatterns {
    payment: Regex,
    verification: Regex,
}

impl ChatPatterns {
    pub fn new(bot_account: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            payment: Regex::new(&format!("{}{}", LINE_PREFIX, PAYMENT_PATTERN))?,
            verification: Regex::new(&format!(
                r"{}(\w+) -> {}: verify\s*$",
                LINE_PREFIX,
                regex::escape(bot_account)
            ))?,
        })
    }

    pub fn classify(&self, line: &str) -> Option<ChatEvent> {
        if let Some(caps) = self.verification.captures(line) {
            return Some(ChatEvent::Verification {
                sender: caps[1].to_string(),
            });
        }
        let caps = self.payment.captures(line)?;
        let payer = caps[1].to_string();
        // the notice ends with a sentence period: "$10,000."
        let raw = caps[2].trim_end_matches('.');
        Some(match parse_amount(raw) {
            Ok(amount) => ChatEvent::Payment { payer, amount },
            Err(error) => ChatEvent::MalformedPayment { payer, error },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> ChatPatterns {
        ChatPatterns::new("BotName").unwrap()
    }

    #[test]
    fn test_payment_with_suffix_and_period() {
        assert_eq!(
            patterns().classify("[12:00:01] Alice paid you $2.5M."),
            Some(ChatEvent::Payment {
                payer: "Alice".into(),
                amount: Decimal::from(2_500_000),
            })
        );
    }

    #[test]
    fn test_payment_with_separators() {
        assert_eq!(
            patterns().classify("Bob_2 paid you $10,000."),
            Some(ChatEvent::Payment {
                payer: "Bob_2".into(),
                amount: Decimal::from(10_000),
            })
        );
    }

    #[test]
    fn test_verification_whisper() {
        assert_eq!(
            patterns().classify("Alice -> BotName: verify"),
            Some(ChatEvent::Verification { sender: "Alice".into() })
        );
        // whisper addressed to someone else
        assert_eq!(patterns().classify("Alice -> OtherBot: verify"), None);
        assert_eq!(patterns().classify("Alice -> BotName: verifying"), None);
    }

    #[test]
    fn test_bot_name_is_literal() {
        let p = ChatPatterns::new("bot.v2").unwrap();
        assert!(p.classify("Alice -> botXv2: verify").is_none());
        assert!(p.classify("Alice -> bot.v2: verify").is_some());
    }

    #[test]
    fn test_unrelated_lines() {
        let p = patterns();
        assert_eq!(p.classify("Alice: hello"), None);
        assert_eq!(p.classify("Alice paid you nothing"), None);
        assert_eq!(p.classify(""), None);
    }

    #[test]
    fn test_patterns_must_start_the_line() {
        let p = patterns();
        // public chat quoting a whisper
        assert_eq!(p.classify("<Mallory> Alice -> BotName: verify"), None);
        // whisper carrying a payment notice
        assert_eq!(p.classify("Mallory -> BotName: Mallory paid you $1T"), None);
        assert_eq!(p.classify("<Mallory> Mallory paid you $1T"), None);
        assert_eq!(
            p.classify("[09:15:42] Alice -> BotName: verify"),
            Some(ChatEvent::Verification { sender: "Alice".into() })
        );
    }

    #[test]
    fn test_malformed_amount_is_reported() {
        assert!(matches!(
            patterns().classify("Alice paid you $1.2.3M"),
            Some(ChatEvent::MalformedPayment { .. })
        ));
    }
}
