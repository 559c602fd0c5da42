//! Research run log: a persisted JSON timeline of every action taken during
//! a run. One file per run under the configured log directory, an ordered
//! list of tagged events with timestamps plus the final counters.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::stats::RunStats;

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    TargetSelected {
        target_id: Uuid,
        url: String,
        reason: String,
    },
    ScrapeResolved {
        target_id: Uuid,
        scrape_id: Uuid,
        cache_hit: bool,
        content_bytes: u64,
    },
    SignalsCommitted {
        target_id: Uuid,
        count: u32,
        reduction_percent: f64,
    },
    ScoreChanged {
        target_id: Uuid,
        previous: u32,
        new: u32,
    },
    JobFailed {
        target_id: Uuid,
        url: String,
        reason: String,
    },
    SweepCompleted {
        scanned: u64,
        deleted: u64,
        remaining: u64,
        alerts: u32,
    },
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize the run log to JSON and write `{dir}/{run_id}.json`.
    /// Returns the file path on success.
    pub fn save(&self, dir: &str, stats: &RunStats) -> Result<PathBuf> {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            run_id: &self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stats,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Run log saved");

        Ok(path)
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: &'a RunStats,
    events: &'a [RunEvent],
}
