// Concurrent access to the shared ledger from many tasks, the way the chat
// scanner, jobs and IPC handlers share it at runtime.

use autopay_core::ledger::{LedgerStore, SharedLedger, WagerOutcome};
use rust_decimal::Decimal;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gambling_data.json");
    let ledger = SharedLedger::new(LedgerStore::load(&path).unwrap());
    ledger.with(|s| s.verify_manual("1001", "Alice").map(|_| ())).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                ledger
                    .with(|s| s.credit_by_game_username("Alice", Decimal::from(5), None))
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let balance = ledger.with(|s| Ok(s.balance("1001"))).await.unwrap();
    assert_eq!(balance, Some(Decimal::from(1_000)));
    // every mutation was written through
    assert_eq!(LedgerStore::load(&path).unwrap().balance("1001"), Some(Decimal::from(1_000)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_wagers_never_overdraw() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = SharedLedger::new(LedgerStore::load(dir.path().join("gambling_data.json")).unwrap());
    ledger
        .with(|s| {
            s.verify_manual("1001", "Alice")?;
            s.credit_by_game_username("Alice", Decimal::from(100), None).map(|_| ())
        })
        .await
        .unwrap();

    // 30 losing stakes of 10 against a balance of 100: exactly 10 can settle
    let mut handles = Vec::new();
    for _ in 0..30 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .with(|s| s.settle_wager("1001", Decimal::from(10), || WagerOutcome::Lost))
                .await
                .is_ok()
        }));
    }
    let mut settled = 0;
    for h in handles {
        if h.await.unwrap() {
            settled += 1;
        }
    }

    assert_eq!(settled, 10);
    let balance = ledger.with(|s| Ok(s.balance("1001"))).await.unwrap();
    assert_eq!(balance, Some(Decimal::ZERO));
}
