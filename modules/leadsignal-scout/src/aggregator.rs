//! Lead score aggregation. The score is never patched incrementally: every
//! recompute reads the target's full current signal set and rebuilds the sum
//! from scratch, so drift cannot accumulate. The CRM owns the target's base
//! score; what leaves here is only the signal-derived component.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use leadsignal_common::{ExtractedSignal, ScoreChangeEvent, SignalAction};

use crate::error::Result;
use crate::store::SignalStore;

// ---------------------------------------------------------------------------
// Event sink
// ---------------------------------------------------------------------------

/// Receives score-change events. The embedding CRM wires its own; a tracing
/// sink ships for standalone runs.
#[async_trait]
pub trait ScoreEventSink: Send + Sync {
    async fn publish(&self, event: &ScoreChangeEvent) -> Result<()>;
}

pub struct LogEventSink;

#[async_trait]
impl ScoreEventSink for LogEventSink {
    async fn publish(&self, event: &ScoreChangeEvent) -> Result<()> {
        info!(
            target_id = %event.target_id,
            previous = event.previous_score,
            new = event.new_score,
            signals = event.triggering_signal_ids.len(),
            "Lead score changed"
        );
        Ok(())
    }
}

/// Buffers every published event for later inspection. Test support.
#[derive(Default)]
pub struct RecordingEventSink {
    events: std::sync::Mutex<Vec<ScoreChangeEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScoreChangeEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScoreEventSink for RecordingEventSink {
    async fn publish(&self, event: &ScoreChangeEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Sum of increase-score contributions, clamped to `[0, 100]`.
/// Order-independent: a plain sum over the set.
pub fn lead_score(signals: &[ExtractedSignal]) -> u32 {
    let sum: i64 = signals
        .iter()
        .filter(|s| s.action == SignalAction::IncreaseScore)
        .map(|s| s.score_contribution as i64)
        .sum();
    sum.clamp(0, 100) as u32
}

pub struct ScoreAggregator {
    store: Arc<dyn SignalStore>,
    sink: Arc<dyn ScoreEventSink>,
    last_emitted: HashMap<Uuid, u32>,
}

impl ScoreAggregator {
    pub fn new(store: Arc<dyn SignalStore>, sink: Arc<dyn ScoreEventSink>) -> Self {
        Self {
            store,
            sink,
            last_emitted: HashMap::new(),
        }
    }

    /// Recompute the target's score from its stored signals. Publishes a
    /// change event only when the value moved; a target whose score holds
    /// steady stays silent. Returns the event if one fired.
    pub async fn recompute(
        &mut self,
        target_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ScoreChangeEvent>> {
        let signals = self.store.signals_for_target(target_id).await?;
        let new_score = lead_score(&signals);

        let previous = self.last_emitted.get(&target_id).copied().unwrap_or(0);
        if previous == new_score {
            debug!(target_id = %target_id, score = new_score, "Lead score unchanged");
            return Ok(None);
        }
        self.last_emitted.insert(target_id, new_score);

        let event = ScoreChangeEvent {
            target_id,
            previous_score: previous,
            new_score,
            triggering_signal_ids: signals
                .iter()
                .filter(|s| s.action == SignalAction::IncreaseScore)
                .map(|s| s.id)
                .collect(),
            timestamp: now,
        };
        self.sink.publish(&event).await?;
        Ok(Some(event))
    }
}
