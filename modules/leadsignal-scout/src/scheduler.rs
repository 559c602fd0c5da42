//! Target scheduling: which targets deserve a research pass right now.
//!
//! Selection is a pure function of the target list, the attempt ledger, and
//! the clock, so every decision is reproducible under test. Three gates
//! apply, in order:
//!
//! - A target that completed research inside the cache TTL window is
//!   skipped. Its scrape is still live, so another pass buys nothing.
//! - A target whose last attempt failed waits out a cooldown that doubles
//!   with each consecutive failure (1x, 2x, 4x, then capped at 8x of the
//!   base), so a permanently broken URL backs off instead of hot-looping.
//! - Whatever survives is ordered most-stale-first and capped at the batch
//!   size. The overflow is deferred to a later sweep, not lost.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use leadsignal_common::ResearchTarget;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// How one research attempt ended, as far as scheduling cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    /// The full pipeline ran and signals were committed.
    Completed,
    /// Fetch or distillation failed for this target alone.
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TargetEntry {
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

/// In-process record of per-target attempt history. The scrape cache is the
/// durable TTL gate; this ledger keeps a long-lived scheduler from
/// re-enqueueing targets between sweeps and carries the failure backoff
/// state. Targets cut down mid-run by an aborted pass are simply never
/// recorded, which leaves them eligible for the next sweep.
#[derive(Debug, Default)]
pub struct TargetLedger {
    entries: HashMap<Uuid, TargetEntry>,
}

impl TargetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target_id: Uuid) -> Option<&TargetEntry> {
        self.entries.get(&target_id)
    }

    pub fn record(&mut self, target_id: Uuid, outcome: TargetOutcome, now: DateTime<Utc>) {
        let entry = self.entries.entry(target_id).or_default();
        entry.last_attempt_at = Some(now);
        match outcome {
            TargetOutcome::Completed => {
                entry.last_completed_at = Some(now);
                entry.consecutive_failures = 0;
            }
            TargetOutcome::Failed => {
                entry.consecutive_failures += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Why a target made the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleReason {
    /// No completed research on record.
    NeverResearched,
    /// The last completed research has aged out of the cache TTL window.
    TtlElapsed,
    /// The last attempt failed and the failure cooldown has now passed.
    CooldownElapsed,
}

impl ScheduleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleReason::NeverResearched => "never_researched",
            ScheduleReason::TtlElapsed => "ttl_elapsed",
            ScheduleReason::CooldownElapsed => "cooldown_elapsed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledTarget {
    pub target: ResearchTarget,
    pub reason: ScheduleReason,
}

#[derive(Debug, Default)]
pub struct ScheduleResult {
    pub scheduled: Vec<ScheduledTarget>,
    /// Completed research inside the TTL window.
    pub skipped_fresh: usize,
    /// Still cooling down after failed attempts.
    pub skipped_cooldown: usize,
    /// Eligible but beyond the batch cap; picked up next sweep.
    pub deferred: usize,
    /// Duplicate target ids or blank URLs, dropped outright.
    pub dropped: usize,
}

pub struct TargetScheduler {
    ttl: Duration,
    cooldown_base: Duration,
    batch_size: usize,
}

impl TargetScheduler {
    pub fn new(ttl_days: i64, failure_cooldown_minutes: i64, batch_size: usize) -> Self {
        Self {
            ttl: Duration::days(ttl_days),
            cooldown_base: Duration::minutes(failure_cooldown_minutes),
            batch_size: if batch_size == 0 { 50 } else { batch_size },
        }
    }

    /// Select the next research batch. Pure: same inputs, same batch.
    pub fn select(
        &self,
        targets: &[ResearchTarget],
        ledger: &TargetLedger,
        now: DateTime<Utc>,
    ) -> ScheduleResult {
        let mut result = ScheduleResult::default();
        let mut seen: HashSet<Uuid> = HashSet::new();
        // (candidate, seconds since last attempt; never attempted sorts first)
        let mut eligible: Vec<(ScheduledTarget, i64)> = Vec::new();

        for target in targets {
            if target.url.trim().is_empty() || !seen.insert(target.target_id) {
                result.dropped += 1;
                continue;
            }

            let entry = ledger
                .get(target.target_id)
                .copied()
                .unwrap_or_default();
            let staleness = entry
                .last_attempt_at
                .map(|t| (now - t).num_seconds())
                .unwrap_or(i64::MAX);

            // The failure cooldown gates before the TTL check: a failing
            // target has no live scrape, but hammering it is worse.
            if entry.consecutive_failures > 0 {
                if let Some(attempt) = entry.last_attempt_at {
                    let cooldown =
                        self.cooldown_base * cooldown_multiplier(entry.consecutive_failures);
                    if now < attempt + cooldown {
                        result.skipped_cooldown += 1;
                        continue;
                    }
                    eligible.push((
                        ScheduledTarget {
                            target: target.clone(),
                            reason: ScheduleReason::CooldownElapsed,
                        },
                        staleness,
                    ));
                    continue;
                }
            }

            match entry.last_completed_at {
                None => eligible.push((
                    ScheduledTarget {
                        target: target.clone(),
                        reason: ScheduleReason::NeverResearched,
                    },
                    staleness,
                )),
                Some(done) if now - done >= self.ttl => eligible.push((
                    ScheduledTarget {
                        target: target.clone(),
                        reason: ScheduleReason::TtlElapsed,
                    },
                    staleness,
                )),
                Some(_) => result.skipped_fresh += 1,
            }
        }

        // Most stale first. Stable sort, so feed order breaks ties.
        eligible.sort_by_key(|(_, staleness)| std::cmp::Reverse(*staleness));

        let total = eligible.len();
        result.scheduled = eligible
            .into_iter()
            .map(|(candidate, _)| candidate)
            .take(self.batch_size)
            .collect();
        result.deferred = total - result.scheduled.len();

        info!(
            scheduled = result.scheduled.len(),
            skipped_fresh = result.skipped_fresh,
            skipped_cooldown = result.skipped_cooldown,
            deferred = result.deferred,
            dropped = result.dropped,
            "Target scheduling complete"
        );

        result
    }
}

/// Cooldown ladder: 1x, 2x, 4x, then capped at 8x the base.
fn cooldown_multiplier(consecutive_failures: u32) -> i32 {
    match consecutive_failures {
        0 => 0,
        1 => 1,
        2 => 2,
        3 => 4,
        _ => 8,
    }
}
