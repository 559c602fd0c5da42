use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leadsignal_archive::{
    ContentFetcher, HttpFetcher, LogAlertSink, PgScrapeStore, RenderFetcher, RetentionSweeper,
    ScrapeCache, SWEEP_INTERVAL,
};
use leadsignal_common::Config;
use leadsignal_distill::Distiller;
use leadsignal_scout::{
    load_definitions, EventKind, LogEventSink, PgSignalStore, Researcher, RunLog, RunStats,
    ScoutError, StaticTargetFeed,
};

#[derive(Parser)]
#[command(name = "leadsignal-scout", about = "Lead research: fetch, distill, score")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one research run over the current target feed.
    Run,
    /// Run research sweeps on a fixed interval until stopped.
    Schedule,
    /// Delete expired scrapes and report cache anomalies.
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("leadsignal=info".parse()?))
        .init();

    let cli = Cli::parse();

    info!("LeadSignal scout starting...");
    let config = Config::from_env();
    config.log_redacted();

    let pool = PgPool::connect(&config.database_url).await?;
    let scrapes = Arc::new(PgScrapeStore::new(pool.clone()));
    scrapes.migrate().await?;

    match cli.command {
        Command::Run => {
            let mut researcher = build_researcher(&config, &pool, scrapes).await?;
            researcher.run().await?;
        }
        Command::Schedule => {
            let sweeper = build_sweeper(&config, scrapes.clone());
            tokio::spawn(async move { sweeper.run_loop(SWEEP_INTERVAL).await });

            let mut researcher = build_researcher(&config, &pool, scrapes).await?;
            researcher
                .run_loop(Duration::from_secs(config.interval_minutes * 60))
                .await;
        }
        Command::Sweep => {
            let report = build_sweeper(&config, scrapes).sweep(Utc::now()).await?;
            info!(
                scanned = report.scanned,
                deleted = report.deleted,
                remaining = report.remaining,
                alerts = report.alerts.len(),
                "Sweep complete"
            );
            if let Some(dir) = &config.run_log_dir {
                let mut log = RunLog::new();
                log.log(EventKind::SweepCompleted {
                    scanned: report.scanned,
                    deleted: report.deleted,
                    remaining: report.remaining,
                    alerts: report.alerts.len() as u32,
                });
                log.save(dir, &RunStats::default())?;
            }
        }
    }

    Ok(())
}

async fn build_researcher(
    config: &Config,
    pool: &PgPool,
    scrapes: Arc<PgScrapeStore>,
) -> Result<Researcher> {
    let definitions_path = config.signal_definitions_path.as_deref().ok_or_else(|| {
        ScoutError::Config("SIGNAL_DEFINITIONS_PATH is required for research runs".to_string())
    })?;
    let targets_path = config.targets_path.as_deref().ok_or_else(|| {
        ScoutError::Config("TARGETS_PATH is required for research runs".to_string())
    })?;

    let definitions = load_definitions(definitions_path)?;
    let feed = Arc::new(StaticTargetFeed::from_file(targets_path)?);

    let timeout = Duration::from_secs(config.fetch_timeout_seconds);
    let fetcher: Arc<dyn ContentFetcher> = match config.render_base_url.as_deref() {
        Some(base) => Arc::new(RenderFetcher::new(
            base,
            config.render_token.as_deref(),
            timeout,
        )),
        None => Arc::new(HttpFetcher::new(timeout)),
    };

    let cache = Arc::new(ScrapeCache::new(
        scrapes,
        fetcher,
        config.ttl_days,
        config.fetch_max_retries,
    ));

    let signals = Arc::new(PgSignalStore::new(pool.clone()));
    signals.migrate().await?;

    let distiller = Arc::new(Distiller::from_definitions(
        definitions,
        config.snippet_max_chars,
        config.confidence_cap,
    ));

    Ok(Researcher::new(
        config,
        feed,
        cache,
        distiller,
        signals,
        Arc::new(LogEventSink),
    ))
}

fn build_sweeper(config: &Config, scrapes: Arc<PgScrapeStore>) -> RetentionSweeper {
    RetentionSweeper::new(
        scrapes,
        Arc::new(LogAlertSink),
        config.ttl_days,
        config.sweep_max_entries,
        config.sweep_max_avg_bytes,
    )
}
