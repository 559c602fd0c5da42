use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use leadsignal_common::{DistillationResult, SignalDefinition, StorageReduction};

use crate::detector::SignalDetector;
use crate::fluff::FluffFilter;
use crate::scorer::ConfidenceScorer;

/// The full distillation pass over one cached scrape: strip fluff, detect
/// definition matches, score them into durable signals. Pure CPU, no IO.
pub struct Distiller {
    fluff: FluffFilter,
    detector: SignalDetector,
    scorer: ConfidenceScorer,
}

impl Distiller {
    pub fn new(fluff: FluffFilter, detector: SignalDetector, scorer: ConfidenceScorer) -> Self {
        Self {
            fluff,
            detector,
            scorer,
        }
    }

    /// Default fluff set, stock scoring knobs.
    pub fn from_definitions(
        definitions: Vec<SignalDefinition>,
        snippet_max_chars: usize,
        confidence_cap: u8,
    ) -> Self {
        Self::new(
            FluffFilter::with_defaults(),
            SignalDetector::new(definitions),
            ConfidenceScorer::new(snippet_max_chars, confidence_cap),
        )
    }

    pub fn distill(
        &self,
        scrape: &leadsignal_common::RawScrape,
        target_id: Uuid,
        is_new_scrape: bool,
        now: DateTime<Utc>,
    ) -> DistillationResult {
        let cleaned = self.fluff.clean(&scrape.raw_content);
        let candidates = self.detector.detect(&cleaned, scrape.platform);
        let signals: Vec<_> = candidates
            .iter()
            .map(|c| self.scorer.score(c, &cleaned, target_id, scrape.id, now))
            .collect();

        let raw_bytes = scrape.raw_content.len() as u64;
        let signal_bytes = signals
            .iter()
            .map(|s| serde_json::to_vec(s).map_or(0, |v| v.len() as u64))
            .sum();
        let reduction = StorageReduction::from_sizes(raw_bytes, signal_bytes);

        debug!(
            target_id = %target_id,
            scrape_id = %scrape.id,
            signals = signals.len(),
            raw_bytes,
            signal_bytes,
            reduction_percent = reduction.percent,
            "Distilled scrape"
        );

        DistillationResult {
            signals,
            scrape_id: scrape.id,
            is_new_scrape,
            reduction,
        }
    }
}
