use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use leadsignal_common::{AnomalyAlert, AnomalyKind};

use crate::error::Result;
use crate::store::ScrapeStore;

/// Default wall-clock interval between sweeps when running as a loop: daily.
pub const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

// --- Alert sink ---

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, alert: &AnomalyAlert);
}

/// Alert sink that writes anomalies to the log. The default in deployments
/// without an operations channel wired up.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, alert: &AnomalyAlert) {
        warn!(
            kind = %alert.kind,
            observed = alert.observed,
            threshold = alert.threshold,
            "Cache anomaly detected"
        );
    }
}

// --- Sweeper ---

/// Result of one sweep, for logs and the run log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: u64,
    pub deleted: u64,
    pub remaining: u64,
    pub alerts: Vec<AnomalyAlert>,
}

/// Deletes expired cache entries and reports cache-health anomalies. Runs on
/// its own cadence, fully independent of research runs, and never touches
/// the signal store.
pub struct RetentionSweeper {
    store: Arc<dyn ScrapeStore>,
    alert_sink: Arc<dyn AlertSink>,
    ttl_days: i64,
    max_entries: u64,
    max_avg_bytes: u64,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn ScrapeStore>,
        alert_sink: Arc<dyn AlertSink>,
        ttl_days: i64,
        max_entries: u64,
        max_avg_bytes: u64,
    ) -> Self {
        Self {
            store,
            alert_sink,
            ttl_days,
            max_entries,
            max_avg_bytes,
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let scanned = self.store.count().await?;
        let deleted = self.store.delete_expired(now).await?;
        let remaining = self.store.count().await?;

        let mut alerts = Vec::new();

        if remaining > self.max_entries {
            alerts.push(AnomalyAlert {
                kind: AnomalyKind::CacheNotShrinking,
                observed: remaining,
                threshold: self.max_entries,
                timestamp: now,
            });
        }

        if remaining > 0 {
            let total = self.store.total_bytes().await?;
            let avg = total / remaining;
            if avg > self.max_avg_bytes {
                alerts.push(AnomalyAlert {
                    kind: AnomalyKind::OversizedEntries,
                    observed: avg,
                    threshold: self.max_avg_bytes,
                    timestamp: now,
                });
            }
        }

        // A survivor older than twice the TTL means deletion is not keeping
        // up (expiries are set at insert, so age and expiry move together).
        let stale_after_days = (2 * self.ttl_days).max(1) as u64;
        if let Some(oldest) = self.store.oldest_fetched_at().await? {
            let age_days = (now - oldest).num_days().max(0) as u64;
            if age_days > stale_after_days {
                alerts.push(AnomalyAlert {
                    kind: AnomalyKind::StaleEntries,
                    observed: age_days,
                    threshold: stale_after_days,
                    timestamp: now,
                });
            }
        }

        for alert in &alerts {
            self.alert_sink.alert(alert).await;
        }

        info!(
            scanned,
            deleted,
            remaining,
            alerts = alerts.len(),
            "Retention sweep complete"
        );

        Ok(SweepReport {
            scanned,
            deleted,
            remaining,
            alerts,
        })
    }

    /// Sweep forever at a fixed interval. Errors are logged and the loop
    /// keeps going; a failed sweep must not take the process down.
    pub async fn run_loop(&self, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep(Utc::now()).await {
                warn!(error = %e, "Retention sweep failed");
            }
        }
    }
}
