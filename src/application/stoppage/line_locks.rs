//! Keyed per-line locks
//!
//! Serializes detection for one line without blocking the others.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct LineLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl LineLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `line_id`. Released when the guard drops.
    pub async fn acquire(&self, line_id: &str) -> OwnedMutexGuard<()> {
        // Clone out of the map so no shard lock is held across the await.
        let lock = self
            .locks
            .entry(line_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_line_is_exclusive() {
        let locks = LineLocks::new();
        let guard = locks.acquire("L1").await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move {
            let _guard = contender.acquire("L1").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn different_lines_do_not_block() {
        let locks = LineLocks::new();
        let _l1 = locks.acquire("L1").await;
        let _l2 = tokio::time::timeout(Duration::from_millis(50), locks.acquire("L2"))
            .await
            .expect("L2 must not wait for L1");
        assert_eq!(locks.len(), 2);
    }
}
