//! Handler tests
//!
//! Run against the in-memory store.

#[cfg(test)]
mod tests {
    use crate::catalog::FeeCatalog;
    use crate::domain::{
        Amount, Direction, DomainError, OperationContext, PostingRequest, PostingTrigger,
        SettlementStatus, SETTLEMENT_CATEGORY,
    };
    use crate::error::AppError;
    use crate::handlers::{
        CashMovementInput, LedgerHandler, SettlementHandler, StatusTransitionCommand,
    };
    use crate::posting::{PostingEngine, PostingOutcome, RuleTable};
    use crate::projection::UnitBalanceService;
    use crate::store::{CashFilter, InMemoryLedgerStore, LedgerStore};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryLedgerStore>,
        ledger: LedgerHandler,
        settlement: SettlementHandler,
        balances: UnitBalanceService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let catalog = FeeCatalog::new(store.clone());
        Fixture {
            ledger: LedgerHandler::new(store.clone(), catalog),
            settlement: SettlementHandler::new(
                store.clone(),
                Duration::from_millis(50),
                Duration::from_secs(60),
            ),
            balances: UnitBalanceService::new(store.clone()),
            store,
        }
    }

    fn cash(unit: &str, direction: Direction, amount: i64) -> CashMovementInput {
        CashMovementInput {
            id: None,
            version: None,
            date: NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
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

    async fn seed_keamanan(fx: &Fixture) {
        let ctx = OperationContext::new();
        for (direction, amount) in [
            (Direction::Masuk, 2000),
            (Direction::Masuk, 50000),
            (Direction::Keluar, 1000),
        ] {
            fx.ledger
                .save_cash_movement(cash("Keamanan", direction, amount), &ctx)
                .await
                .unwrap();
        }
    }

    async fn unsettled_net(fx: &Fixture, unit: &str) -> Decimal {
        fx.balances
            .balance(unit, Some(SettlementStatus::Unsettled))
            .await
            .unwrap()
            .net
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    #[tokio::test]
    async fn test_settlement_sweeps_all_unsettled_rows() {
        let fx = fixture();
        seed_keamanan(&fx).await;

        let quote = fx.settlement.quote("Keamanan").await.unwrap();
        assert_eq!(quote.amount.value(), dec!(51000));
        assert_eq!(quote.rows.len(), 3);

        let result = fx
            .settlement
            .confirm(quote.quote_id, &OperationContext::new().with_actor("Bendahara Unit"))
            .await
            .unwrap();

        assert_eq!(result.treasury_entry.amount.value(), dec!(51000));
        assert_eq!(result.treasury_entry.direction, Direction::Masuk);
        assert_eq!(result.treasury_entry.category, SETTLEMENT_CATEGORY);
        assert_eq!(result.treasury_entry.note, "Setoran Operasional Unit Keamanan");
        assert_eq!(result.treasury_entry.recipient, "Bendahara");
        assert_eq!(result.settled_rows.len(), 3);

        let rows = fx
            .store
            .list_cash_movements(&CashFilter::unit("Keamanan"))
            .await
            .unwrap();
        assert!(rows.iter().all(|r| r.settlement_status == SettlementStatus::Settled
            && r.settlement_id == Some(result.treasury_entry.id)));

        assert_eq!(unsettled_net(&fx, "Keamanan").await, Decimal::ZERO);
        let settled = fx
            .balances
            .balance("Keamanan", Some(SettlementStatus::Settled))
            .await
            .unwrap();
        assert_eq!(settled.net, dec!(51000));
    }

    #[tokio::test]
    async fn test_quote_without_unsettled_cash_is_insufficient() {
        let fx = fixture();

        let err = fx.settlement.quote("Kesehatan").await.unwrap_err();
        match err {
            AppError::Domain(DomainError::InsufficientBalance { unit, balance }) => {
                assert_eq!(unit, "Kesehatan");
                assert_eq!(balance, Decimal::ZERO);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(fx.store.counts().await.2, 0);
    }

    #[tokio::test]
    async fn test_negative_net_is_insufficient() {
        let fx = fixture();
        fx.ledger
            .save_cash_movement(cash("Dapur", Direction::Keluar, 3000), &OperationContext::new())
            .await
            .unwrap();

        let err = fx.settlement.quote("Dapur").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InsufficientBalance { balance, .. }) if balance == dec!(-3000)
        ));
    }

    #[tokio::test]
    async fn test_immediate_resettle_is_insufficient() {
        let fx = fixture();
        seed_keamanan(&fx).await;

        fx.settlement
            .settle("Keamanan", &OperationContext::new(), |_| true)
            .await
            .unwrap();

        let err = fx
            .settlement
            .settle("Keamanan", &OperationContext::new(), |_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InsufficientBalance { .. })));
        assert_eq!(fx.store.counts().await.2, 1);
    }

    #[tokio::test]
    async fn test_rows_added_after_quote_stay_unsettled() {
        let fx = fixture();
        seed_keamanan(&fx).await;

        let quote = fx.settlement.quote("Keamanan").await.unwrap();
        fx.ledger
            .save_cash_movement(cash("Keamanan", Direction::Masuk, 4000), &OperationContext::new())
            .await
            .unwrap();

        let result = fx
            .settlement
            .confirm(quote.quote_id, &OperationContext::new())
            .await
            .unwrap();
        assert_eq!(result.amount.value(), dec!(51000));
        assert_eq!(unsettled_net(&fx, "Keamanan").await, dec!(4000));

        // The next settlement takes only the new row
        let next = fx
            .settlement
            .settle("Keamanan", &OperationContext::new(), |_| true)
            .await
            .unwrap();
        assert_eq!(next.amount.value(), dec!(4000));
        assert_eq!(next.settled_rows.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_row_aborts_whole_settlement() {
        let fx = fixture();
        seed_keamanan(&fx).await;

        let quote = fx.settlement.quote("Keamanan").await.unwrap();

        // Someone marks one quoted row in progress before confirmation
        let row = quote.rows[0];
        fx.ledger
            .transition(
                "Keamanan",
                row.id,
                StatusTransitionCommand {
                    to: SettlementStatus::InProgress,
                    expected_version: Some(row.version),
                },
                &OperationContext::new(),
            )
            .await
            .unwrap();

        let err = fx
            .settlement
            .confirm(quote.quote_id, &OperationContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SettlementConflict(_)));
        assert!(err.is_retryable());

        // Nothing was written
        assert_eq!(fx.store.counts().await.2, 0);
        let settled = fx
            .balances
            .balance("Keamanan", Some(SettlementStatus::Settled))
            .await
            .unwrap();
        assert_eq!(settled.rows, 0);
    }

    #[tokio::test]
    async fn test_quote_confirms_only_once() {
        let fx = fixture();
        seed_keamanan(&fx).await;

        let quote = fx.settlement.quote("Keamanan").await.unwrap();
        fx.settlement
            .confirm(quote.quote_id, &OperationContext::new())
            .await
            .unwrap();

        let err = fx
            .settlement
            .confirm(quote.quote_id, &OperationContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QuoteNotFound(id) if id == quote.quote_id));
    }

    #[tokio::test]
    async fn test_cancelled_settlement_writes_nothing() {
        let fx = fixture();
        seed_keamanan(&fx).await;

        let err = fx
            .settlement
            .settle("Keamanan", &OperationContext::new(), |quote| {
                assert_eq!(quote.amount.value(), dec!(51000));
                false
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SettlementCancelled));
        assert_eq!(unsettled_net(&fx, "Keamanan").await, dec!(51000));

        let quote = fx.settlement.quote("Keamanan").await.unwrap();
        fx.settlement.cancel(quote.quote_id).unwrap();
        assert!(matches!(
            fx.settlement.cancel(quote.quote_id),
            Err(AppError::QuoteNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_settles_exactly_one_wins() {
        let fx = fixture();
        seed_keamanan(&fx).await;

        let first = fx.settlement.quote("Keamanan").await.unwrap();
        let second = fx.settlement.quote("Keamanan").await.unwrap();

        let ctx = OperationContext::new();
        let (a, b) = tokio::join!(
            fx.settlement.confirm(first.quote_id, &ctx),
            fx.settlement.confirm(second.quote_id, &ctx),
        );

        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(
            loser,
            AppError::SettlementConflict(_) | AppError::ConcurrentSettlement { .. }
        ));
        assert_eq!(fx.store.counts().await.2, 1);
    }

    #[tokio::test]
    async fn test_blank_unit_quote_is_validation_error() {
        let fx = fixture();
        let err = fx.settlement.quote("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_quote_above_cap_names_the_cap() {
        let fx = fixture();
        let ctx = OperationContext::new();
        for _ in 0..2 {
            fx.ledger
                .save_cash_movement(cash("Keamanan", Direction::Masuk, 900_000_000_000), &ctx)
                .await
                .unwrap();
        }

        let err = fx.settlement.quote("Keamanan").await.unwrap_err();
        match err {
            AppError::Domain(DomainError::SettlementCapExceeded { unit, net, .. }) => {
                assert_eq!(unit, "Keamanan");
                assert_eq!(net, dec!(1800000000000));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    // =========================================================================
    // Manual ledger maintenance
    // =========================================================================

    #[tokio::test]
    async fn test_new_row_defaults() {
        let fx = fixture();
        let row = fx
            .ledger
            .save_cash_movement(cash("Keamanan", Direction::Masuk, 2000), &OperationContext::new())
            .await
            .unwrap();

        assert_eq!(row.settlement_status, SettlementStatus::Unsettled);
        assert_eq!(row.version, 1);
        assert_eq!(row.responsible_party, "Keamanan (Otomatis)");
    }

    #[tokio::test]
    async fn test_cannot_create_settled_row() {
        let fx = fixture();
        let mut input = cash("Keamanan", Direction::Masuk, 2000);
        input.settlement_status = Some(SettlementStatus::Settled);

        let err = fx
            .ledger
            .save_cash_movement(input, &OperationContext::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InvalidStatusTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_edit_is_version_conflict() {
        let fx = fixture();
        let ctx = OperationContext::new();
        let row = fx
            .ledger
            .save_cash_movement(cash("Keamanan", Direction::Masuk, 2000), &ctx)
            .await
            .unwrap();

        let mut edit = cash("Keamanan", Direction::Masuk, 2500);
        edit.id = Some(row.id);
        edit.version = Some(row.version);
        let edited = fx.ledger.save_cash_movement(edit.clone(), &ctx).await.unwrap();
        assert_eq!(edited.version, row.version + 1);
        assert_eq!(edited.amount.value(), dec!(2500));

        // Same edit based on the old version
        let err = fx.ledger.save_cash_movement(edit, &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::VersionConflict { expected: 1, found: 2 })
        ));
    }

    #[tokio::test]
    async fn test_settled_row_is_immutable() {
        let fx = fixture();
        let ctx = OperationContext::new();
        seed_keamanan(&fx).await;
        let result = fx.settlement.settle("Keamanan", &ctx, |_| true).await.unwrap();
        let settled = &result.settled_rows[0];

        let err = fx
            .ledger
            .transition(
                "Keamanan",
                settled.id,
                StatusTransitionCommand {
                    to: SettlementStatus::Unsettled,
                    expected_version: None,
                },
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::SettledRowImmutable(_))));

        let mut edit = cash("Keamanan", Direction::Masuk, 1);
        edit.id = Some(settled.id);
        let err = fx.ledger.save_cash_movement(edit, &ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::SettledRowImmutable(_))));
    }

    #[tokio::test]
    async fn test_manual_transition_cannot_settle() {
        let fx = fixture();
        let ctx = OperationContext::new();
        let row = fx
            .ledger
            .save_cash_movement(cash("Keamanan", Direction::Masuk, 2000), &ctx)
            .await
            .unwrap();

        let err = fx
            .ledger
            .transition(
                "Keamanan",
                row.id,
                StatusTransitionCommand {
                    to: SettlementStatus::Settled,
                    expected_version: None,
                },
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InvalidStatusTransition { .. })
        ));

        let in_progress = fx
            .ledger
            .transition(
                "Keamanan",
                row.id,
                StatusTransitionCommand {
                    to: SettlementStatus::InProgress,
                    expected_version: None,
                },
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(in_progress.settlement_status, SettlementStatus::InProgress);

        // In-progress rows are not part of the next quote
        let err = fx.settlement.quote("Keamanan").await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn test_posted_row_keeps_posted_fields() {
        let fx = fixture();
        let ctx = OperationContext::new();
        let engine = PostingEngine::new(
            fx.store.clone(),
            FeeCatalog::new(fx.store.clone()),
            RuleTable::builtin(),
        );
        let request = PostingRequest::new(
            PostingTrigger::LeaveRequestSaved {
                reason: "Pulang".to_string(),
            },
            "Keamanan",
            "Muhammad Faiz",
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        );
        let PostingOutcome::Posted { cash_movement, .. } = engine.post(&request, &ctx).await.unwrap()
        else {
            panic!("expected a posting");
        };

        let edit = |amount: Amount, note: Option<&str>| CashMovementInput {
            id: Some(cash_movement.id),
            version: Some(cash_movement.version),
            date: cash_movement.date,
            unit: cash_movement.unit.clone(),
            direction: cash_movement.direction,
            category: cash_movement.category.clone(),
            amount,
            subject_name: cash_movement.subject_name.clone(),
            note: note.map(str::to_string),
            responsible_party: None,
            settlement_status: None,
        };

        let err = fx
            .ledger
            .save_cash_movement(edit(Amount::from_integer(9000).unwrap(), None), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::Validation(_))));

        // Fields outside the posting stay editable
        let updated = fx
            .ledger
            .save_cash_movement(edit(cash_movement.amount, Some("Dibayar tunai")), &ctx)
            .await
            .unwrap();
        assert_eq!(updated.note, "Dibayar tunai");
        assert_eq!(updated.amount, cash_movement.amount);
    }
}
