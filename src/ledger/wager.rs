use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;

use super::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerOutcome {
    Won,
    Lost,
}

#[derive(Debug, Clone, Serialize)]
pub struct WagerResult {
    pub external_id: String,
    pub stake: Decimal,
    pub outcome: WagerOutcome,
    /// Balance after settlement
    pub balance: Decimal,
}

pub fn validate_stake(stake: Decimal, balance: Decimal) -> Result<(), LedgerError> {
    if stake <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveStake);
    }
    if stake > balance {
        return Err(LedgerError::InsufficientBalance { balance, stake });
    }
    Ok(())
}

/// Draw an outcome that wins with probability `win_probability`.
pub fn draw(win_probability: f64) -> WagerOutcome {
    let p = if win_probability.is_nan() {
        0.0
    } else {
        win_probability.clamp(0.0, 1.0)
    };
    if rand::rng().random_bool(p) {
        WagerOutcome::Won
    } else {
        WagerOutcome::Lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerStore;

    #[test]
    fn test_stake_validation() {
        let balance = Decimal::from(100);
        assert!(validate_stake(Decimal::from(100), balance).is_ok());
        assert!(matches!(
            validate_stake(Decimal::ZERO, balance),
            Err(LedgerError::NonPositiveStake)
        ));
        assert!(matches!(
            validate_stake(Decimal::from(101), balance),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_draw_extremes() {
        assert_eq!(draw(1.0), WagerOutcome::Won);
        assert_eq!(draw(0.0), WagerOutcome::Lost);
        assert_eq!(draw(f64::NAN), WagerOutcome::Lost);
        assert_eq!(draw(7.0), WagerOutcome::Won);
    }

    #[test]
    fn test_settlement_credits_and_debits() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LedgerStore::load(dir.path().join("ledger.json")).unwrap();
        store.verify_manual("1001", "Alice").unwrap();
        store.credit_by_game_username("Alice", Decimal::from(1_000), None).unwrap();

        let won = store.settle_wager("1001", Decimal::from(400), || WagerOutcome::Won).unwrap();
        assert_eq!(won.balance, Decimal::from(1_400));
        let lost = store.settle_wager("1001", Decimal::from(1_400), || WagerOutcome::Lost).unwrap();
        assert_eq!(lost.balance, Decimal::ZERO);

        let reloaded = LedgerStore::load(store.path()).unwrap();
        assert_eq!(reloaded.balance("1001"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_rejected_stake_does_not_draw() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LedgerStore::load(dir.path().join("ledger.json")).unwrap();
        store.verify_manual("1001", "Alice").unwrap();

        let result = store.settle_wager("1001", Decimal::from(5), || panic!("drawn"));
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        assert!(matches!(
            store.settle_wager("9999", Decimal::from(5), || WagerOutcome::Won),
            Err(LedgerError::UnknownUser(_))
        ));
    }
}
