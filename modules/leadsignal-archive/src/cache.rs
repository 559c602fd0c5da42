use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};
use uuid::Uuid;

use leadsignal_common::{normalize_url, Platform, RawScrape, ResearchTarget};

use crate::error::{ArchiveError, Result};
use crate::fetch::{fetch_with_retry, ContentFetcher};
use crate::normalize::normalize_content;
use crate::store::ScrapeStore;

type Flight = Arc<OnceCell<(RawScrape, bool)>>;

/// Read-through cache over the scrape store. A URL with a live entry is
/// served from storage; otherwise the page is fetched, normalized, and
/// cached with a TTL.
///
/// Concurrent requests for the same URL share one fetch: the in-flight map
/// hands every caller the same cell, and the cell runs its initializer at
/// most once at a time. A failed leader leaves the cell empty, so the next
/// waiter retries serially rather than poisoning the URL.
pub struct ScrapeCache {
    store: Arc<dyn ScrapeStore>,
    fetcher: Arc<dyn ContentFetcher>,
    ttl: Duration,
    max_attempts: u32,
    in_flight: Mutex<HashMap<String, Flight>>,
}

impl ScrapeCache {
    pub fn new(
        store: Arc<dyn ScrapeStore>,
        fetcher: Arc<dyn ContentFetcher>,
        ttl_days: i64,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            fetcher,
            ttl: Duration::days(ttl_days),
            max_attempts,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live entry for the target's URL, fetching on a miss.
    /// The flag is true when this call put a new entry in the cache.
    pub async fn get_or_fetch(
        &self,
        target: &ResearchTarget,
        now: DateTime<Utc>,
    ) -> Result<(RawScrape, bool)> {
        let url = normalize_url(&target.url);

        if let Some(existing) = self.store.find_live_by_url(&url, now).await? {
            debug!(url, scrape_id = %existing.id, "Cache hit by URL");
            return Ok((existing, false));
        }

        let cell = {
            let mut flights = self.in_flight.lock().await;
            flights
                .entry(url.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let outcome = cell
            .get_or_try_init(|| self.fetch_and_insert(target, &url, now))
            .await
            .cloned();

        // Drop the flight entry, but only our own: a later caller may have
        // replaced it already.
        {
            let mut flights = self.in_flight.lock().await;
            if let Some(current) = flights.get(&url) {
                if Arc::ptr_eq(current, &cell) {
                    flights.remove(&url);
                }
            }
        }

        outcome
    }

    async fn fetch_and_insert(
        &self,
        target: &ResearchTarget,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<(RawScrape, bool)> {
        let html = fetch_with_retry(self.fetcher.as_ref(), url, self.max_attempts)
            .await
            .map_err(|source| ArchiveError::fetch(url, source))?;

        let normalized = normalize_content(&html, url);

        // Another process may have stored this exact content since our URL
        // lookup missed. Reuse its row instead of duplicating.
        if let Some(existing) = self
            .store
            .find_live_by_hash(url, &normalized.hash, now)
            .await?
        {
            debug!(url, scrape_id = %existing.id, "Cache hit by content hash");
            return Ok((existing, false));
        }

        let platform = target
            .platform_hint
            .unwrap_or_else(|| Platform::from_url(url));
        let scrape = RawScrape {
            id: Uuid::new_v4(),
            target_url: url.to_string(),
            content_hash: normalized.hash,
            raw_content: normalized.text,
            platform,
            fetched_at: now,
            expires_at: now + self.ttl,
        };
        self.store.insert(&scrape).await?;

        info!(
            url,
            scrape_id = %scrape.id,
            bytes = scrape.raw_content.len(),
            expires_at = %scrape.expires_at,
            "Cached new scrape"
        );
        Ok((scrape, true))
    }
}
