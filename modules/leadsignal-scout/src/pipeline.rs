//! The research pipeline: schedule, fetch and distill in parallel, commit
//! sequentially, aggregate scores.
//!
//! Fetch latency dominates, so fetching and distillation run through a
//! bounded worker pool. Everything that writes (signal commits, score
//! recomputes, ledger updates) happens on the consuming side, one result
//! at a time. A target-scoped failure costs that target its slot until the
//! cooldown passes; a store failure aborts the whole run, and targets never
//! recorded in the ledger simply come back next sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use tracing::{error, info, warn};

use leadsignal_archive::{ArchiveError, ScrapeCache};
use leadsignal_common::{Config, DistillationResult, ResearchTarget};
use leadsignal_distill::Distiller;

use crate::aggregator::{ScoreAggregator, ScoreEventSink};
use crate::error::Result;
use crate::feed::TargetFeed;
use crate::run_log::{EventKind, RunLog};
use crate::scheduler::{TargetLedger, TargetOutcome, TargetScheduler};
use crate::stats::RunStats;
use crate::store::SignalStore;

/// How one target's job ended.
enum JobOutcome {
    /// Fetch (or cache hit) and distillation finished inside the deadline.
    Distilled(DistillationResult),
    /// Target-scoped failure; the cooldown ladder takes it from here.
    Failed { reason: String },
    /// The job deadline fired mid-pipeline.
    DeadlineExceeded,
    /// A store went away. The run cannot continue.
    Systemic(ArchiveError),
}

/// Fetch, cache, and distill one target under a deadline. Pure with respect
/// to the signal store: nothing is committed here.
async fn research_target(
    cache: &ScrapeCache,
    distiller: &Distiller,
    target: &ResearchTarget,
    deadline: Duration,
    now: DateTime<Utc>,
) -> JobOutcome {
    let job = async {
        let (scrape, is_new) = cache.get_or_fetch(target, now).await?;
        Ok::<_, ArchiveError>(distiller.distill(&scrape, target.target_id, is_new, now))
    };

    match tokio::time::timeout(deadline, job).await {
        Err(_) => JobOutcome::DeadlineExceeded,
        Ok(Ok(result)) => JobOutcome::Distilled(result),
        Ok(Err(e @ ArchiveError::Fetch { .. })) => JobOutcome::Failed {
            reason: e.to_string(),
        },
        Ok(Err(e)) => JobOutcome::Systemic(e),
    }
}

pub struct Researcher {
    feed: Arc<dyn TargetFeed>,
    scheduler: TargetScheduler,
    ledger: TargetLedger,
    cache: Arc<ScrapeCache>,
    distiller: Arc<Distiller>,
    signals: Arc<dyn SignalStore>,
    aggregator: ScoreAggregator,
    worker_concurrency: usize,
    job_deadline: Duration,
    run_log_dir: Option<String>,
}

impl Researcher {
    pub fn new(
        config: &Config,
        feed: Arc<dyn TargetFeed>,
        cache: Arc<ScrapeCache>,
        distiller: Arc<Distiller>,
        signals: Arc<dyn SignalStore>,
        events: Arc<dyn ScoreEventSink>,
    ) -> Self {
        // Wide enough for every fetch retry plus backoff plus distillation.
        let job_deadline = Duration::from_secs(
            config.fetch_timeout_seconds * (config.fetch_max_retries as u64 + 1),
        );
        Self {
            feed,
            scheduler: TargetScheduler::new(
                config.ttl_days,
                config.failure_cooldown_minutes,
                config.batch_size,
            ),
            ledger: TargetLedger::new(),
            cache,
            distiller,
            aggregator: ScoreAggregator::new(Arc::clone(&signals), events),
            signals,
            worker_concurrency: config.worker_concurrency.max(1),
            job_deadline,
            run_log_dir: config.run_log_dir.clone(),
        }
    }

    /// One full research pass over the feed.
    pub async fn run(&mut self) -> Result<RunStats> {
        let now = Utc::now();
        let mut stats = RunStats::default();
        let mut run_log = RunLog::new();

        let targets = self.feed.eligible_targets().await?;
        let schedule = self.scheduler.select(&targets, &self.ledger, now);
        stats.targets_selected = schedule.scheduled.len() as u32;
        stats.targets_deferred = schedule.deferred as u32;

        for scheduled in &schedule.scheduled {
            run_log.log(EventKind::TargetSelected {
                target_id: scheduled.target.target_id,
                url: scheduled.target.url.clone(),
                reason: scheduled.reason.as_str().to_string(),
            });
        }

        if schedule.scheduled.is_empty() {
            info!("No targets due for research");
            self.finish(&run_log, &stats);
            return Ok(stats);
        }

        let cache = Arc::clone(&self.cache);
        let distiller = Arc::clone(&self.distiller);
        let deadline = self.job_deadline;
        let jobs = schedule.scheduled.into_iter().map(move |scheduled| {
            let cache = Arc::clone(&cache);
            let distiller = Arc::clone(&distiller);
            async move {
                let outcome =
                    research_target(&cache, &distiller, &scheduled.target, deadline, now).await;
                (scheduled.target, outcome)
            }
        });
        let mut results = stream::iter(jobs).buffer_unordered(self.worker_concurrency);

        while let Some((target, outcome)) = results.next().await {
            match outcome {
                JobOutcome::Distilled(result) => {
                    if let Err(e) = self
                        .commit(&target, result, now, &mut stats, &mut run_log)
                        .await
                    {
                        error!(
                            target_id = %target.target_id,
                            error = %e,
                            "Signal store write failed, aborting run"
                        );
                        self.finish(&run_log, &stats);
                        return Err(e);
                    }
                }
                JobOutcome::Failed { reason } => {
                    warn!(
                        target_id = %target.target_id,
                        url = target.url.as_str(),
                        reason = reason.as_str(),
                        "Target research failed"
                    );
                    run_log.log(EventKind::JobFailed {
                        target_id: target.target_id,
                        url: target.url.clone(),
                        reason,
                    });
                    self.ledger
                        .record(target.target_id, TargetOutcome::Failed, now);
                    stats.targets_failed += 1;
                }
                JobOutcome::DeadlineExceeded => {
                    warn!(
                        target_id = %target.target_id,
                        url = target.url.as_str(),
                        deadline_secs = self.job_deadline.as_secs(),
                        "Job deadline exceeded, no signals committed"
                    );
                    run_log.log(EventKind::JobFailed {
                        target_id: target.target_id,
                        url: target.url.clone(),
                        reason: "deadline exceeded".to_string(),
                    });
                    self.ledger
                        .record(target.target_id, TargetOutcome::Failed, now);
                    stats.targets_failed += 1;
                    stats.jobs_timed_out += 1;
                }
                JobOutcome::Systemic(e) => {
                    // Dropping the stream cancels the in-flight jobs; none of
                    // them were recorded, so all come back next sweep.
                    error!(error = %e, "Scrape store unreachable, aborting run");
                    self.finish(&run_log, &stats);
                    return Err(e.into());
                }
            }
        }

        info!("{stats}");
        self.finish(&run_log, &stats);
        Ok(stats)
    }

    /// Write one distilled result through: signals, score, ledger, log.
    async fn commit(
        &mut self,
        target: &ResearchTarget,
        result: DistillationResult,
        now: DateTime<Utc>,
        stats: &mut RunStats,
        run_log: &mut RunLog,
    ) -> Result<()> {
        if result.is_new_scrape {
            stats.cache_misses += 1;
        } else {
            stats.cache_hits += 1;
        }
        stats.bytes_raw += result.reduction.raw_bytes;
        stats.bytes_distilled += result.reduction.signal_bytes;
        stats.signals_detected += result.signals.len() as u32;

        run_log.log(EventKind::ScrapeResolved {
            target_id: target.target_id,
            scrape_id: result.scrape_id,
            cache_hit: !result.is_new_scrape,
            content_bytes: result.reduction.raw_bytes,
        });

        self.signals.upsert_batch(&result.signals).await?;
        stats.signals_stored += result.signals.len() as u32;
        if !result.signals.is_empty() {
            run_log.log(EventKind::SignalsCommitted {
                target_id: target.target_id,
                count: result.signals.len() as u32,
                reduction_percent: result.reduction.percent,
            });
        }

        // Unconditional: stored signals from earlier runs count too, and a
        // quiet page must not zero a previously scored target.
        if let Some(event) = self.aggregator.recompute(target.target_id, now).await? {
            stats.score_events += 1;
            run_log.log(EventKind::ScoreChanged {
                target_id: event.target_id,
                previous: event.previous_score,
                new: event.new_score,
            });
        }

        self.ledger
            .record(target.target_id, TargetOutcome::Completed, now);
        stats.targets_completed += 1;

        Ok(())
    }

    /// Run research sweeps forever at a fixed interval. A failed sweep is
    /// logged and the next one starts fresh.
    pub async fn run_loop(&mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Research scheduler started");

        loop {
            ticker.tick().await;
            match self.run().await {
                Ok(stats) => info!(
                    completed = stats.targets_completed,
                    failed = stats.targets_failed,
                    "Research sweep finished"
                ),
                Err(e) => error!(error = %e, "Research sweep aborted"),
            }
        }
    }

    fn finish(&self, run_log: &RunLog, stats: &RunStats) {
        if let Some(dir) = &self.run_log_dir {
            if let Err(e) = run_log.save(dir, stats) {
                warn!(error = %e, "Failed to save run log");
            }
        }
    }
}
