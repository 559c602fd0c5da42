use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use leadsignal_common::RawScrape;

use crate::error::Result;

/// Storage for raw scrapes. Entries are expiring by contract: readers see
/// only live (unexpired) rows, and `delete_expired` is the one mutation
/// that removes data. Signals live in a different store with no expiry.
#[async_trait]
pub trait ScrapeStore: Send + Sync {
    /// Newest live entry for a normalized URL.
    async fn find_live_by_url(&self, url: &str, now: DateTime<Utc>) -> Result<Option<RawScrape>>;

    /// Live entry with this exact content for the URL, if any.
    async fn find_live_by_hash(
        &self,
        url: &str,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RawScrape>>;

    async fn insert(&self, scrape: &RawScrape) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<RawScrape>>;

    /// Remove entries whose expiry has passed. Returns how many went.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn count(&self) -> Result<u64>;

    /// Total stored content size in bytes, expired entries included.
    async fn total_bytes(&self) -> Result<u64>;

    async fn oldest_fetched_at(&self) -> Result<Option<DateTime<Utc>>>;
}

/// In-memory store for tests and single-process runs.
#[derive(Default)]
pub struct MemoryScrapeStore {
    entries: RwLock<HashMap<Uuid, RawScrape>>,
}

impl MemoryScrapeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScrapeStore for MemoryScrapeStore {
    async fn find_live_by_url(&self, url: &str, now: DateTime<Utc>) -> Result<Option<RawScrape>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|s| s.target_url == url && !s.is_expired(now))
            .max_by_key(|s| s.fetched_at)
            .cloned())
    }

    async fn find_live_by_hash(
        &self,
        url: &str,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RawScrape>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|s| {
                s.target_url == url && s.content_hash == content_hash && !s.is_expired(now)
            })
            .max_by_key(|s| s.fetched_at)
            .cloned())
    }

    async fn insert(&self, scrape: &RawScrape) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(scrape.id, scrape.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RawScrape>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&id).cloned())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, s| !s.is_expired(now));
        Ok((before - entries.len()) as u64)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.entries.read().await.len() as u64)
    }

    async fn total_bytes(&self) -> Result<u64> {
        let entries = self.entries.read().await;
        Ok(entries.values().map(|s| s.raw_content.len() as u64).sum())
    }

    async fn oldest_fetched_at(&self) -> Result<Option<DateTime<Utc>>> {
        let entries = self.entries.read().await;
        Ok(entries.values().map(|s| s.fetched_at).min())
    }
}
