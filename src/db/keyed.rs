// KeyedStore: serializes writes per result key.
//
// Runs for different (date, algorithm) keys write in parallel; two writes
// for the same key queue behind one tokio Mutex, so the later write is
// the one that sticks. Reads pass straight through. A key's lock is
// dropped from the table once no writer holds or waits on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::models::StoredResultSummary;
use super::traits::ResultStore;
use crate::topics::{ResultKey, TopicModelResult};

pub struct KeyedStore {
    inner: Arc<dyn ResultStore>,
    locks: Mutex<HashMap<ResultKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedStore {
    pub fn new(inner: Arc<dyn ResultStore>) -> Self {
        Self {
            inner,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: ResultKey) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| anyhow::anyhow!("Key lock table poisoned: {}", e))?;
        Ok(locks.entry(key).or_default().clone())
    }

    /// Forget `key` if the table and `lock` are its only holders. Clones
    /// are only taken under the table mutex, so the count can't grow here.
    fn release(&self, key: ResultKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ResultStore for KeyedStore {
    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn save_result(&self, result: &TopicModelResult) -> Result<()> {
        let key = result.key();
        let lock = self.lock_for(key)?;
        let saved = {
            let _guard = lock.lock().await;
            self.inner.save_result(result).await
        };
        self.release(key, lock);
        saved
    }

    async fn load_result(&self, key: ResultKey) -> Result<Option<TopicModelResult>> {
        self.inner.load_result(key).await
    }

    async fn list_results(&self) -> Result<Vec<StoredResultSummary>> {
        self.inner.list_results().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::sample_result;
    use crate::topics::traits::Algorithm;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts how many writes for the same key overlap.
    #[derive(Default)]
    struct OverlapProbe {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ResultStore for OverlapProbe {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn save_result(&self, _result: &TopicModelResult) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
        async fn load_result(&self, _key: ResultKey) -> Result<Option<TopicModelResult>> {
            Ok(None)
        }
        async fn list_results(&self) -> Result<Vec<StoredResultSummary>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_same_key_writes_never_overlap() {
        let probe = Arc::new(OverlapProbe::default());
        let store = Arc::new(KeyedStore::new(probe.clone()));
        let result = sample_result("2024-03-01", Algorithm::Lda);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let result = result.clone();
                tokio::spawn(async move { store.save_result(&result).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(store.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_lock_table_empties_after_writes() {
        let store = KeyedStore::new(Arc::new(OverlapProbe::default()));
        for day in ["2024-03-01", "2024-03-02", "2024-03-03"] {
            store.save_result(&sample_result(day, Algorithm::Lda)).await.unwrap();
        }
        assert_eq!(store.tracked_keys(), 0);

        // A held lock stays tracked until its writer finishes
        let key = sample_result("2024-03-04", Algorithm::Nmf).key();
        let held = store.lock_for(key).unwrap();
        assert_eq!(store.tracked_keys(), 1);
        store.release(key, held);
        assert_eq!(store.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_write_concurrently() {
        let probe = Arc::new(OverlapProbe::default());
        let store = Arc::new(KeyedStore::new(probe.clone()));

        let a = sample_result("2024-03-01", Algorithm::Lda);
        let b = sample_result("2024-03-01", Algorithm::Nmf);
        let (ra, rb) = tokio::join!(store.save_result(&a), store.save_result(&b));
        ra.unwrap();
        rb.unwrap();

        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 2);
    }
}
