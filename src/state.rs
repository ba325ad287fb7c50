//! Application state
//!
//! Services shared by every request handler and the background scheduler.

use std::sync::Arc;

use crate::catalog::FeeCatalog;
use crate::config::Config;
use crate::handlers::{LedgerHandler, SettlementHandler};
use crate::outbox::OutboxService;
use crate::posting::{PostingEngine, RuleTable, SubjectDirectory};
use crate::projection::{TreasuryRecapService, UnitBalanceService};
use crate::store::{InMemoryLedgerStore, LedgerStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub catalog: FeeCatalog,
    pub engine: PostingEngine,
    pub outbox: OutboxService,
    pub ledger: LedgerHandler,
    pub settlement: SettlementHandler,
    pub balances: UnitBalanceService,
    pub recap: TreasuryRecapService,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire every service over one store.
    pub fn new(store: Arc<dyn LedgerStore>, config: &Config, rules: RuleTable) -> Self {
        Self::build(store, config, rules, None)
    }

    /// Same as [`AppState::new`], resolving subject ids through `directory`.
    pub fn with_directory(
        store: Arc<dyn LedgerStore>,
        config: &Config,
        rules: RuleTable,
        directory: Arc<dyn SubjectDirectory>,
    ) -> Self {
        Self::build(store, config, rules, Some(directory))
    }

    /// In-memory state with the built-in posting rules
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryLedgerStore::new()),
            &Config::in_memory(),
            RuleTable::builtin(),
        )
    }

    fn build(
        store: Arc<dyn LedgerStore>,
        config: &Config,
        rules: RuleTable,
        directory: Option<Arc<dyn SubjectDirectory>>,
    ) -> Self {
        let catalog = FeeCatalog::with_config(
            store.clone(),
            config.fee_cache_capacity,
            config.fee_cache_ttl_secs,
        );

        let mut engine = PostingEngine::new(store.clone(), catalog.clone(), rules);
        if let Some(directory) = directory {
            engine = engine.with_directory(directory);
        }

        Self {
            outbox: OutboxService::new(store.clone(), engine.clone()),
            ledger: LedgerHandler::new(store.clone(), catalog.clone()),
            settlement: SettlementHandler::new(
                store.clone(),
                config.settlement_lock_timeout,
                config.settlement_quote_ttl,
            ),
            balances: UnitBalanceService::new(store.clone()),
            recap: TreasuryRecapService::new(store.clone()),
            catalog,
            engine,
            store,
            config: Arc::new(config.clone()),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("settlement", &self.settlement)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
