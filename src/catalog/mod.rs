//! Fee Catalog
//!
//! Prices of named services, keyed by (unit, service name). Lookups go
//! through a TTL cache in front of the ledger store.

use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Amount, FeeCatalogEntry};
use crate::store::{LedgerStore, StoreResult};

/// Default cache capacity (number of keys).
pub const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// Default time-to-live for cached prices.
pub const DEFAULT_TTL_SECS: u64 = 60;

type CacheKey = (String, String);

/// Read-through catalog of service prices.
///
/// Misses are cached too, so a catalog without an entry for a service does not
/// hit the store on every posting.
#[derive(Clone)]
pub struct FeeCatalog {
    store: Arc<dyn LedgerStore>,
    cache: Cache<CacheKey, Option<Amount>>,
}

impl FeeCatalog {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, DEFAULT_CACHE_CAPACITY, DEFAULT_TTL_SECS)
    }

    pub fn with_config(store: Arc<dyn LedgerStore>, max_capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { store, cache }
    }

    /// Price of an active entry matching `unit` and `service_name` exactly.
    pub async fn lookup(&self, unit: &str, service_name: &str) -> StoreResult<Option<Amount>> {
        let key = (unit.to_string(), service_name.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let price = self
            .store
            .find_fee(unit, service_name)
            .await?
            .filter(|entry| entry.active)
            .map(|entry| entry.price);

        self.cache.insert(key, price);
        Ok(price)
    }

    /// Catalog price, or `default` when the catalog has none.
    ///
    /// Store errors are treated like a miss: a posting is never blocked by
    /// the catalog.
    pub async fn price_or_default(&self, unit: &str, service_name: &str, default: Amount) -> Amount {
        match self.lookup(unit, service_name).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                tracing::debug!(
                    unit = %unit,
                    service_name = %service_name,
                    default = %default,
                    "No catalog price, using rule default"
                );
                default
            }
            Err(e) => {
                tracing::warn!(
                    unit = %unit,
                    service_name = %service_name,
                    error = %e,
                    "Catalog lookup failed, using rule default"
                );
                default
            }
        }
    }

    pub async fn list(&self) -> StoreResult<Vec<FeeCatalogEntry>> {
        self.store.list_fees().await
    }

    /// Insert or replace an entry and drop its cached price.
    pub async fn upsert(&self, entry: &FeeCatalogEntry) -> StoreResult<()> {
        self.store.upsert_fee(entry).await?;
        self.cache
            .invalidate(&(entry.unit.clone(), entry.service_name.clone()));
        Ok(())
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl std::fmt::Debug for FeeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeeCatalog")
            .field("cached_entries", &self.cache.entry_count())
            .finish()
    }
}
