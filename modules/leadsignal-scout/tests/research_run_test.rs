//! End-to-end research runs against in-memory stores and a scripted fetcher.
//! No network, no database. Where a test needs exact page text it seeds the
//! scrape cache directly, so distillation runs over known content.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use leadsignal_archive::{
    ArchiveError, ContentFetcher, FetchError, FetchResult, MemoryScrapeStore, RetentionSweeper,
    ScrapeCache, ScrapeStore,
};
use leadsignal_common::{
    content_hash, normalize_url, Config, Platform, PriorityClass, RawScrape, ResearchTarget,
    SignalAction, SignalDefinition,
};
use leadsignal_distill::Distiller;
use leadsignal_scout::{
    MemorySignalStore, RecordingEventSink, Researcher, ScoutError, SignalStore, StaticTargetFeed,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        ttl_days: 7,
        batch_size: 50,
        interval_minutes: 60,
        failure_cooldown_minutes: 240,
        fetch_timeout_seconds: 30,
        fetch_max_retries: 1,
        worker_concurrency: 4,
        render_base_url: None,
        render_token: None,
        snippet_max_chars: 500,
        confidence_cap: 99,
        sweep_max_entries: 100_000,
        sweep_max_avg_bytes: 256 * 1024,
        signal_definitions_path: None,
        targets_path: None,
        run_log_dir: None,
    }
}

fn definition(id: &str, keywords: &[&str], contribution: i32) -> SignalDefinition {
    SignalDefinition {
        id: id.to_string(),
        label: id.to_string(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        regex_pattern: None,
        priority_class: PriorityClass::High,
        platform_filter: None,
        score_contribution: contribution,
        action: SignalAction::IncreaseScore,
    }
}

fn make_target(url: &str) -> ResearchTarget {
    ResearchTarget {
        target_id: Uuid::new_v4(),
        url: url.to_string(),
        platform_hint: None,
    }
}

/// A live cache entry with known post-extraction text.
fn make_scrape(url: &str, content: &str, now: DateTime<Utc>) -> RawScrape {
    RawScrape {
        id: Uuid::new_v4(),
        target_url: normalize_url(url),
        content_hash: content_hash(content),
        raw_content: content.to_string(),
        platform: Platform::Website,
        fetched_at: now,
        expires_at: now + chrono::Duration::days(7),
    }
}

/// Serves canned pages, counts calls, optionally stalls.
struct ScriptedFetcher {
    pages: HashMap<String, String>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl ScriptedFetcher {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(u, c)| (u.to_string(), c.to_string()))
                .collect(),
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    fn unreachable() -> Self {
        Self::new(&[])
    }

    fn stalled(delay: Duration) -> Self {
        Self {
            pages: HashMap::new(),
            delay: Some(delay),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Unreachable("no scripted page".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct TestContext {
    fetcher: Arc<ScriptedFetcher>,
    scrapes: Arc<MemoryScrapeStore>,
    signals: Arc<MemorySignalStore>,
    sink: Arc<RecordingEventSink>,
    researcher: Researcher,
}

fn context(
    config: &Config,
    definitions: Vec<SignalDefinition>,
    targets: Vec<ResearchTarget>,
    fetcher: ScriptedFetcher,
) -> TestContext {
    let fetcher = Arc::new(fetcher);
    let scrapes = Arc::new(MemoryScrapeStore::new());
    let signals = Arc::new(MemorySignalStore::new());
    let sink = Arc::new(RecordingEventSink::new());

    let cache = Arc::new(ScrapeCache::new(
        scrapes.clone(),
        fetcher.clone(),
        config.ttl_days,
        config.fetch_max_retries,
    ));
    let distiller = Arc::new(Distiller::from_definitions(
        definitions,
        config.snippet_max_chars,
        config.confidence_cap,
    ));
    let researcher = Researcher::new(
        config,
        Arc::new(StaticTargetFeed::new(targets)),
        cache,
        distiller,
        signals.clone(),
        sink.clone(),
    );

    TestContext {
        fetcher,
        scrapes,
        signals,
        sink,
        researcher,
    }
}

// ---------------------------------------------------------------------------
// Scenario: hiring page produces a scored, evidence-backed signal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hiring_page_produces_high_confidence_signal() {
    let config = test_config();
    let target = make_target("https://acme.example");
    let mut ctx = context(
        &config,
        vec![definition("actively-hiring", &["hiring"], 15)],
        vec![target.clone()],
        ScriptedFetcher::new(&[]),
    );

    let now = Utc::now();
    ctx.scrapes
        .insert(&make_scrape(
            &target.url,
            "Big news: we're hiring 20 engineers this quarter.",
            now,
        ))
        .await
        .unwrap();

    let stats = ctx.researcher.run().await.unwrap();

    assert_eq!(stats.targets_selected, 1);
    assert_eq!(stats.targets_completed, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.signals_detected, 1);
    assert_eq!(stats.signals_stored, 1);
    assert_eq!(stats.score_events, 1);
    assert_eq!(ctx.fetcher.calls(), 0, "live cache entry, no fetch");

    let signals = ctx.signals.signals_for_target(target.target_id).await.unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].confidence, 75);
    assert_eq!(signals[0].score_contribution, 15);
    assert!(signals[0].evidence_snippet.to_lowercase().contains("hiring"));

    let events = ctx.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous_score, 0);
    assert_eq!(events[0].new_score, 15);
}

// ---------------------------------------------------------------------------
// Scenario: a completed target is not re-researched inside the TTL window
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_run_skips_fresh_target() {
    let config = test_config();
    let url = "https://acme.example/news";
    let normalized = normalize_url(url);
    let mut ctx = context(
        &config,
        vec![definition("actively-hiring", &["hiring"], 15)],
        vec![make_target(url)],
        ScriptedFetcher::new(&[(
            normalized.as_str(),
            "<html><body><p>Quiet quarter.</p></body></html>",
        )]),
    );

    let first = ctx.researcher.run().await.unwrap();
    assert_eq!(first.targets_completed, 1);
    assert_eq!(first.cache_misses, 1);
    assert_eq!(ctx.fetcher.calls(), 1);

    let second = ctx.researcher.run().await.unwrap();
    assert_eq!(second.targets_selected, 0);
    assert_eq!(ctx.fetcher.calls(), 1, "no fetch for a fresh target");
}

// ---------------------------------------------------------------------------
// Scenario: two targets sharing one URL share one fetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shared_url_fetches_once_for_both_targets() {
    let config = test_config();
    let normalized = normalize_url("https://acme.example");
    let a = make_target("https://acme.example/?utm_source=crm");
    let b = make_target("https://acme.example/#about");
    let mut ctx = context(
        &config,
        vec![definition("actively-hiring", &["hiring"], 15)],
        vec![a.clone(), b.clone()],
        ScriptedFetcher::new(&[(
            normalized.as_str(),
            "<html><body><p>About Acme.</p></body></html>",
        )]),
    );

    let stats = ctx.researcher.run().await.unwrap();

    assert_eq!(stats.targets_completed, 2);
    assert_eq!(ctx.fetcher.calls(), 1, "tracking params and fragments share one page");
    assert_eq!(stats.cache_hits + stats.cache_misses, 2);
    assert_eq!(ctx.scrapes.count().await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Scenario: fetch failure backs the target off
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_failure_applies_cooldown() {
    let config = test_config();
    let target = make_target("https://dead.example");
    let mut ctx = context(
        &config,
        vec![definition("actively-hiring", &["hiring"], 15)],
        vec![target.clone()],
        ScriptedFetcher::unreachable(),
    );

    let first = ctx.researcher.run().await.unwrap();
    assert_eq!(first.targets_failed, 1);
    assert_eq!(first.targets_completed, 0);
    assert_eq!(ctx.signals.count().await.unwrap(), 0);
    assert_eq!(ctx.fetcher.calls(), 1);

    // Cooldown (240 minutes) has not elapsed; the target sits this one out.
    let second = ctx.researcher.run().await.unwrap();
    assert_eq!(second.targets_selected, 0);
    assert_eq!(ctx.fetcher.calls(), 1);
}

// ---------------------------------------------------------------------------
// Scenario: deadline fires mid-job, nothing is committed
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn deadline_exceeded_commits_nothing() {
    let config = test_config();
    let target = make_target("https://slow.example");
    // Job deadline is fetch_timeout * (retries + 1) = 60s; the fetcher
    // stalls for ten minutes.
    let mut ctx = context(
        &config,
        vec![definition("actively-hiring", &["hiring"], 15)],
        vec![target.clone()],
        ScriptedFetcher::stalled(Duration::from_secs(600)),
    );

    let stats = ctx.researcher.run().await.unwrap();

    assert_eq!(stats.jobs_timed_out, 1);
    assert_eq!(stats.targets_failed, 1);
    assert_eq!(stats.signals_stored, 0);
    assert_eq!(ctx.signals.count().await.unwrap(), 0, "all-or-nothing per job");
    assert!(ctx.sink.events().is_empty());
}

// ---------------------------------------------------------------------------
// Scenario: contributions sum and clamp at 100
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scoring_accumulates_and_clamps() {
    let config = test_config();
    let target = make_target("https://acme.example");
    let mut ctx = context(
        &config,
        vec![
            definition("actively-hiring", &["hiring"], 15),
            definition("funding-round", &["funding"], 25),
            definition("acquisition", &["acquisition"], 70),
        ],
        vec![target.clone()],
        ScriptedFetcher::new(&[]),
    );

    let now = Utc::now();
    ctx.scrapes
        .insert(&make_scrape(
            &target.url,
            "We're hiring. Fresh funding secured. Acquisition of Initech planned.",
            now,
        ))
        .await
        .unwrap();

    let stats = ctx.researcher.run().await.unwrap();
    assert_eq!(stats.signals_stored, 3);

    let events = ctx.sink.events();
    assert_eq!(events.len(), 1, "one recompute per job, not one per signal");
    assert_eq!(events[0].previous_score, 0);
    assert_eq!(events[0].new_score, 100, "15 + 25 + 70 clamps to 100");
    assert_eq!(events[0].triggering_signal_ids.len(), 3);
}

// ---------------------------------------------------------------------------
// Scenario: the sweeper reaps expired scrapes, never signals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_reaps_expired_scrape_but_not_signals() {
    let config = test_config();
    let target = make_target("https://acme.example");
    let ctx = context(
        &config,
        vec![definition("actively-hiring", &["hiring"], 15)],
        vec![target.clone()],
        ScriptedFetcher::new(&[]),
    );

    let now = Utc::now();
    let mut scrape = make_scrape(&target.url, "we're hiring", now - chrono::Duration::days(8));
    scrape.expires_at = now - chrono::Duration::days(1);
    ctx.scrapes.insert(&scrape).await.unwrap();

    // A signal distilled from that scrape while it was live.
    let distiller = Distiller::from_definitions(
        vec![definition("actively-hiring", &["hiring"], 15)],
        config.snippet_max_chars,
        config.confidence_cap,
    );
    let result = distiller.distill(&scrape, target.target_id, true, now);
    ctx.signals.upsert_batch(&result.signals).await.unwrap();
    assert_eq!(ctx.signals.count().await.unwrap(), 1);

    let sweeper = RetentionSweeper::new(
        ctx.scrapes.clone(),
        Arc::new(leadsignal_archive::LogAlertSink),
        config.ttl_days,
        config.sweep_max_entries,
        config.sweep_max_avg_bytes,
    );
    let report = sweeper.sweep(now).await.unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(ctx.scrapes.count().await.unwrap(), 0);
    assert_eq!(
        ctx.signals.count().await.unwrap(),
        1,
        "signals outlive their source scrape"
    );
}

// ---------------------------------------------------------------------------
// Scenario: store outages abort the run without wedging targets
// ---------------------------------------------------------------------------

/// Signal store that can be switched into a failing state.
struct FlakySignalStore {
    inner: MemorySignalStore,
    fail: AtomicBool,
}

impl FlakySignalStore {
    fn new(failing: bool) -> Self {
        Self {
            inner: MemorySignalStore::new(),
            fail: AtomicBool::new(failing),
        }
    }

    fn heal(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> leadsignal_scout::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(ScoutError::Other(anyhow::anyhow!("signal store down")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SignalStore for FlakySignalStore {
    async fn upsert_batch(
        &self,
        signals: &[leadsignal_common::ExtractedSignal],
    ) -> leadsignal_scout::Result<()> {
        self.check()?;
        self.inner.upsert_batch(signals).await
    }

    async fn signals_for_target(
        &self,
        target_id: Uuid,
    ) -> leadsignal_scout::Result<Vec<leadsignal_common::ExtractedSignal>> {
        self.check()?;
        self.inner.signals_for_target(target_id).await
    }

    async fn count(&self) -> leadsignal_scout::Result<u64> {
        self.check()?;
        self.inner.count().await
    }
}

#[tokio::test]
async fn signal_store_outage_aborts_run_and_target_returns() {
    let config = test_config();
    let target = make_target("https://acme.example");
    let fetcher = Arc::new(ScriptedFetcher::new(&[]));
    let scrapes = Arc::new(MemoryScrapeStore::new());
    let signals = Arc::new(FlakySignalStore::new(true));
    let sink = Arc::new(RecordingEventSink::new());

    let now = Utc::now();
    scrapes
        .insert(&make_scrape(&target.url, "we're hiring", now))
        .await
        .unwrap();

    let cache = Arc::new(ScrapeCache::new(
        scrapes.clone(),
        fetcher.clone(),
        config.ttl_days,
        config.fetch_max_retries,
    ));
    let distiller = Arc::new(Distiller::from_definitions(
        vec![definition("actively-hiring", &["hiring"], 15)],
        config.snippet_max_chars,
        config.confidence_cap,
    ));
    let mut researcher = Researcher::new(
        &config,
        Arc::new(StaticTargetFeed::new(vec![target.clone()])),
        cache,
        distiller,
        signals.clone(),
        sink,
    );

    assert!(researcher.run().await.is_err(), "store outage is fatal for the run");

    // Nothing was recorded for the target, so the next run picks it up.
    signals.heal();
    let stats = researcher.run().await.unwrap();
    assert_eq!(stats.targets_selected, 1);
    assert_eq!(stats.targets_completed, 1);
    assert_eq!(signals.inner.count().await.unwrap(), 1);
}

/// Scrape store whose reads fail until healed; writes delegate throughout.
struct FlakyScrapeStore {
    inner: MemoryScrapeStore,
    fail: AtomicBool,
}

impl FlakyScrapeStore {
    fn new(failing: bool) -> Self {
        Self {
            inner: MemoryScrapeStore::new(),
            fail: AtomicBool::new(failing),
        }
    }

    fn heal(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> leadsignal_archive::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(ArchiveError::Other(anyhow::anyhow!("scrape store down")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ScrapeStore for FlakyScrapeStore {
    async fn find_live_by_url(
        &self,
        url: &str,
        now: DateTime<Utc>,
    ) -> leadsignal_archive::Result<Option<RawScrape>> {
        self.check()?;
        self.inner.find_live_by_url(url, now).await
    }

    async fn find_live_by_hash(
        &self,
        url: &str,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> leadsignal_archive::Result<Option<RawScrape>> {
        self.check()?;
        self.inner.find_live_by_hash(url, content_hash, now).await
    }

    async fn insert(&self, scrape: &RawScrape) -> leadsignal_archive::Result<()> {
        self.inner.insert(scrape).await
    }

    async fn get(&self, id: Uuid) -> leadsignal_archive::Result<Option<RawScrape>> {
        self.inner.get(id).await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> leadsignal_archive::Result<u64> {
        self.inner.delete_expired(now).await
    }

    async fn count(&self) -> leadsignal_archive::Result<u64> {
        self.inner.count().await
    }

    async fn total_bytes(&self) -> leadsignal_archive::Result<u64> {
        self.inner.total_bytes().await
    }

    async fn oldest_fetched_at(&self) -> leadsignal_archive::Result<Option<DateTime<Utc>>> {
        self.inner.oldest_fetched_at().await
    }
}

#[tokio::test]
async fn scrape_store_outage_aborts_run_and_target_returns() {
    let config = test_config();
    let normalized = normalize_url("https://acme.example");
    let target = make_target("https://acme.example");
    let fetcher = Arc::new(ScriptedFetcher::new(&[(
        normalized.as_str(),
        "<html><body><p>Acme news.</p></body></html>",
    )]));
    let scrapes = Arc::new(FlakyScrapeStore::new(true));
    let signals = Arc::new(MemorySignalStore::new());
    let sink = Arc::new(RecordingEventSink::new());

    let cache = Arc::new(ScrapeCache::new(
        scrapes.clone(),
        fetcher.clone(),
        config.ttl_days,
        config.fetch_max_retries,
    ));
    let distiller = Arc::new(Distiller::from_definitions(
        vec![definition("actively-hiring", &["hiring"], 15)],
        config.snippet_max_chars,
        config.confidence_cap,
    ));
    let mut researcher = Researcher::new(
        &config,
        Arc::new(StaticTargetFeed::new(vec![target.clone()])),
        cache,
        distiller,
        signals,
        sink,
    );

    assert!(researcher.run().await.is_err());

    scrapes.heal();
    let stats = researcher.run().await.unwrap();
    assert_eq!(stats.targets_selected, 1, "aborted target comes back");
    assert_eq!(stats.targets_completed, 1);
}

// ---------------------------------------------------------------------------
// Run log
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_log_written_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.run_log_dir = Some(dir.path().to_str().unwrap().to_string());

    let target = make_target("https://acme.example");
    let mut ctx = context(
        &config,
        vec![definition("actively-hiring", &["hiring"], 15)],
        vec![target.clone()],
        ScriptedFetcher::new(&[]),
    );
    ctx.scrapes
        .insert(&make_scrape(&target.url, "we're hiring", Utc::now()))
        .await
        .unwrap();

    ctx.researcher.run().await.unwrap();

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();

    assert_eq!(parsed["stats"]["targets_completed"], 1);
    let events = parsed["events"].as_array().unwrap();
    assert_eq!(events[0]["type"], "target_selected");
    assert!(events
        .iter()
        .any(|e| e["type"] == "score_changed" && e["new"] == 15));
}
