pub mod cache;
pub mod error;
pub mod fetch;
mod normalize;
pub mod pg;
pub mod store;
pub mod sweeper;

pub use cache::ScrapeCache;
pub use error::{ArchiveError, FetchError, FetchResult, Result};
pub use fetch::{fetch_with_retry, ContentFetcher, HttpFetcher, RenderFetcher};
pub use pg::PgScrapeStore;
pub use store::{MemoryScrapeStore, ScrapeStore};
pub use sweeper::{AlertSink, LogAlertSink, RetentionSweeper, SweepReport, SWEEP_INTERVAL};
