use std::env;

use tracing::info;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Scrape cache (temporary tier)
    pub ttl_days: i64,

    // Scheduler
    pub batch_size: usize,
    pub interval_minutes: u64,
    pub failure_cooldown_minutes: i64,

    // Fetching
    pub fetch_timeout_seconds: u64,
    pub fetch_max_retries: u32,
    pub worker_concurrency: usize,
    pub render_base_url: Option<String>,
    pub render_token: Option<String>,

    // Distillation
    pub snippet_max_chars: usize,
    pub confidence_cap: u8,

    // Retention sweeper
    pub sweep_max_entries: u64,
    pub sweep_max_avg_bytes: u64,

    // Inputs
    pub signal_definitions_path: Option<String>,
    pub targets_path: Option<String>,

    // Run log
    pub run_log_dir: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing or malformed.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            ttl_days: parsed_env("LEADSIGNAL_TTL_DAYS", 7),
            batch_size: parsed_env("LEADSIGNAL_BATCH_SIZE", 50),
            interval_minutes: parsed_env("LEADSIGNAL_INTERVAL_MINUTES", 60),
            failure_cooldown_minutes: parsed_env("LEADSIGNAL_FAILURE_COOLDOWN_MINUTES", 240),
            fetch_timeout_seconds: parsed_env("LEADSIGNAL_FETCH_TIMEOUT_SECONDS", 30),
            fetch_max_retries: parsed_env("LEADSIGNAL_FETCH_MAX_RETRIES", 3),
            worker_concurrency: parsed_env("LEADSIGNAL_WORKER_CONCURRENCY", 20),
            snippet_max_chars: parsed_env("LEADSIGNAL_SNIPPET_MAX_CHARS", 500),
            confidence_cap: parsed_env("LEADSIGNAL_CONFIDENCE_CAP", 99),
            sweep_max_entries: parsed_env("LEADSIGNAL_SWEEP_MAX_ENTRIES", 100_000),
            sweep_max_avg_bytes: parsed_env("LEADSIGNAL_SWEEP_MAX_AVG_BYTES", 256 * 1024),
            render_base_url: env::var("RENDER_BASE_URL").ok(),
            render_token: env::var("RENDER_TOKEN").ok(),
            signal_definitions_path: env::var("SIGNAL_DEFINITIONS_PATH").ok(),
            targets_path: env::var("TARGETS_PATH").ok(),
            run_log_dir: env::var("RUN_LOG_DIR").ok(),
        }
    }

    /// Log the effective configuration without credentials.
    pub fn log_redacted(&self) {
        info!(
            ttl_days = self.ttl_days,
            batch_size = self.batch_size,
            interval_minutes = self.interval_minutes,
            failure_cooldown_minutes = self.failure_cooldown_minutes,
            fetch_timeout_seconds = self.fetch_timeout_seconds,
            fetch_max_retries = self.fetch_max_retries,
            worker_concurrency = self.worker_concurrency,
            snippet_max_chars = self.snippet_max_chars,
            confidence_cap = self.confidence_cap,
            render = self.render_base_url.is_some(),
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid number, got {raw:?}")),
        Err(_) => default,
    }
}
