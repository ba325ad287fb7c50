//! Per-unit settlement locks

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per unit. Different units never contend.
#[derive(Debug, Clone)]
pub struct UnitLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl UnitLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Wait up to the configured timeout for the unit's lock.
    /// Returns `None` when the wait runs out.
    pub async fn acquire(&self, unit: &str) -> Option<OwnedMutexGuard<()>> {
        // Clone the Arc out so the map shard is not held across the await
        let lock = self
            .locks
            .entry(unit.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        tokio::time::timeout(self.timeout, lock.lock_owned()).await.ok()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_unit_times_out_while_held() {
        let locks = UnitLocks::new(Duration::from_millis(20));

        let guard = locks.acquire("Keamanan").await;
        assert!(guard.is_some());
        assert!(locks.acquire("Keamanan").await.is_none());

        drop(guard);
        assert!(locks.acquire("Keamanan").await.is_some());
    }

    #[tokio::test]
    async fn test_different_units_do_not_contend() {
        let locks = UnitLocks::new(Duration::from_millis(20));

        let _keamanan = locks.acquire("Keamanan").await.unwrap();
        assert!(locks.acquire("Kesehatan").await.is_some());
    }
}
