//! Integration tests for concurrent settlement

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use unit_ledger::domain::{Direction, OperationContext, SettlementStatus};
use unit_ledger::handlers::{CashMovementInput, SettlementHandler};
use unit_ledger::store::{CashFilter, InMemoryLedgerStore, LedgerStore};
use unit_ledger::{Amount, AppError};

mod common;

fn cash(unit: &str, direction: Direction, amount: i64) -> CashMovementInput {
    CashMovementInput {
        id: None,
        version: None,
        date: chrono::NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        unit: unit.to_string(),
        direction,
        category: "Operasional".to_string(),
        amount: Amount::from_integer(amount).unwrap(),
        subject_name: None,
        note: None,
        responsible_party: None,
        settlement_status: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_settlements_of_one_unit() {
    let (state, store) = common::setup_state();
    let ctx = OperationContext::new();

    for amount in [1000, 2000, 3000] {
        state
            .ledger
            .save_cash_movement(cash("Keamanan", Direction::Masuk, amount), &ctx)
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let settlement = state.settlement.clone();
        tasks.push(tokio::spawn(async move {
            settlement
                .settle("Keamanan", &OperationContext::system(), |_| true)
                .await
        }));
    }

    let mut settled = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(result) => settled.push(result),
            Err(AppError::SettlementConflict(_))
            | Err(AppError::ConcurrentSettlement { .. })
            | Err(AppError::Domain(unit_ledger::DomainError::InsufficientBalance { .. })) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].amount.value(), dec!(6000));

    let treasury = store.list_treasury_entries().await.unwrap();
    assert_eq!(treasury.len(), 1);

    let rows = store
        .list_cash_movements(&CashFilter::unit("Keamanan"))
        .await
        .unwrap();
    assert!(rows.iter().all(|r| r.settlement_status == SettlementStatus::Settled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_units_settle_independently() {
    let (state, store) = common::setup_state();
    let ctx = OperationContext::new();

    for unit in ["Keamanan", "Kesehatan", "Dapur"] {
        state
            .ledger
            .save_cash_movement(cash(unit, Direction::Masuk, 5000), &ctx)
            .await
            .unwrap();
        state
            .ledger
            .save_cash_movement(cash(unit, Direction::Keluar, 1500), &ctx)
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for unit in ["Keamanan", "Kesehatan", "Dapur"] {
        let settlement = state.settlement.clone();
        tasks.push(tokio::spawn(async move {
            settlement.settle(unit, &OperationContext::system(), |_| true).await
        }));
    }

    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.amount.value(), dec!(3500));
    }
    assert_eq!(store.list_treasury_entries().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_lock_timeout_reports_concurrent_settlement() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let settlement = SettlementHandler::new(store.clone(), Duration::from_millis(20), Duration::from_secs(60));
    let ledger = unit_ledger::handlers::LedgerHandler::new(
        store.clone(),
        unit_ledger::catalog::FeeCatalog::new(store.clone()),
    );

    ledger
        .save_cash_movement(cash("Keamanan", Direction::Masuk, 1000), &OperationContext::new())
        .await
        .unwrap();
    let quote = settlement.quote("Keamanan").await.unwrap();

    // Another confirmation holds the unit
    let locks = settlement.locks();
    let _held = locks.acquire("Keamanan").await.unwrap();

    let err = settlement
        .confirm(quote.quote_id, &OperationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConcurrentSettlement { ref unit } if unit == "Keamanan"));
    assert!(err.is_retryable());
}
