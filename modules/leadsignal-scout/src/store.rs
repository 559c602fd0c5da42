//! Durable signal storage. This is the permanent tier: signals survive the
//! retention sweeper reaping the raw scrapes they came from.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use leadsignal_common::ExtractedSignal;

use crate::error::Result;

/// One row per `(target_id, definition_id)`: re-detecting a signal updates
/// the existing row rather than stacking duplicates.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Insert or update the batch as one unit. Either every signal lands or
    /// none do; a job that dies mid-write leaves no partial evidence.
    async fn upsert_batch(&self, signals: &[ExtractedSignal]) -> Result<()>;

    /// All current signals for one target.
    async fn signals_for_target(&self, target_id: Uuid) -> Result<Vec<ExtractedSignal>>;

    async fn count(&self) -> Result<u64>;
}

/// In-memory store for tests and development. Keyed by the signal identity;
/// an upsert keeps the existing row id, like the Postgres `ON CONFLICT`
/// path does.
#[derive(Default)]
pub struct MemorySignalStore {
    signals: RwLock<HashMap<(Uuid, String), ExtractedSignal>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn upsert_batch(&self, signals: &[ExtractedSignal]) -> Result<()> {
        let mut map = self.signals.write().await;
        for signal in signals {
            let key = (signal.target_id, signal.definition_id.clone());
            match map.get_mut(&key) {
                Some(existing) => {
                    let id = existing.id;
                    *existing = signal.clone();
                    existing.id = id;
                }
                None => {
                    map.insert(key, signal.clone());
                }
            }
        }
        Ok(())
    }

    async fn signals_for_target(&self, target_id: Uuid) -> Result<Vec<ExtractedSignal>> {
        let map = self.signals.read().await;
        let mut signals: Vec<_> = map
            .values()
            .filter(|s| s.target_id == target_id)
            .cloned()
            .collect();
        signals.sort_by(|a, b| a.definition_id.cmp(&b.definition_id));
        Ok(signals)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.signals.read().await.len() as u64)
    }
}
