//! Research orchestration: target scheduling, the fetch, distill, and store
//! pipeline, lead score aggregation, and run reporting.

pub mod aggregator;
pub mod definitions;
pub mod error;
pub mod feed;
pub mod pg;
pub mod pipeline;
pub mod run_log;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use aggregator::{
    lead_score, LogEventSink, RecordingEventSink, ScoreAggregator, ScoreEventSink,
};
pub use definitions::load_definitions;
pub use error::{Result, ScoutError};
pub use feed::{StaticTargetFeed, TargetFeed};
pub use pg::PgSignalStore;
pub use pipeline::Researcher;
pub use run_log::{EventKind, RunLog};
pub use scheduler::{
    ScheduleReason, ScheduleResult, ScheduledTarget, TargetEntry, TargetLedger, TargetOutcome,
    TargetScheduler,
};
pub use stats::RunStats;
pub use store::{MemorySignalStore, SignalStore};
