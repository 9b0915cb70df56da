//! Per-remittance async locks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use remit_core::RemittanceId;

/// Keyed async mutexes, one per remittance.
///
/// The outer map lock is synchronous and never held across `.await`.
/// Entries nobody holds or waits on are pruned on the next acquisition.
#[derive(Debug, Default, Clone)]
pub struct RemittanceLocks {
    inner: Arc<Mutex<HashMap<RemittanceId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RemittanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: RemittanceId) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock();
            map.retain(|key, m| *key == id || Arc::strong_count(m) > 1);
            map.entry(id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_id_is_serialized() {
        let locks = RemittanceLocks::new();
        let id = RemittanceId::new();
        let guard = locks.lock(id).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = RemittanceLocks::new();
        let _a = locks.lock(RemittanceId::new()).await;
        let _b = locks.lock(RemittanceId::new()).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = RemittanceLocks::new();
        for _ in 0..5 {
            let _g = locks.lock(RemittanceId::new()).await;
        }
        let _g = locks.lock(RemittanceId::new()).await;
        assert_eq!(locks.len(), 1);
    }
}
