// Postgres-backed scrape cache storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use leadsignal_common::{Platform, RawScrape};

use crate::error::Result;
use crate::store::ScrapeStore;

pub struct PgScrapeStore {
    pool: PgPool,
}

/// A row from the raw_scrapes table. Platform is stored as text and parsed
/// leniently on the way out.
#[derive(Debug, sqlx::FromRow)]
struct ScrapeRow {
    id: Uuid,
    target_url: String,
    content_hash: String,
    raw_content: String,
    platform: String,
    fetched_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<ScrapeRow> for RawScrape {
    fn from(r: ScrapeRow) -> Self {
        RawScrape {
            id: r.id,
            target_url: r.target_url,
            content_hash: r.content_hash,
            raw_content: r.raw_content,
            platform: Platform::from_str_loose(&r.platform),
            fetched_at: r.fetched_at,
            expires_at: r.expires_at,
        }
    }
}

impl PgScrapeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run idempotent schema migrations: table plus lookup indexes.
    pub async fn migrate(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS raw_scrapes (
                id UUID PRIMARY KEY,
                target_url TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                raw_content TEXT NOT NULL,
                platform TEXT NOT NULL,
                fetched_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_raw_scrapes_url_live
                ON raw_scrapes (target_url, expires_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_raw_scrapes_hash
                ON raw_scrapes (target_url, content_hash)",
            "CREATE INDEX IF NOT EXISTS idx_raw_scrapes_expiry
                ON raw_scrapes (expires_at)",
        ];

        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        info!("Scrape cache schema ready");
        Ok(())
    }
}

#[async_trait]
impl ScrapeStore for PgScrapeStore {
    async fn find_live_by_url(&self, url: &str, now: DateTime<Utc>) -> Result<Option<RawScrape>> {
        let row = sqlx::query_as::<_, ScrapeRow>(
            r#"
            SELECT * FROM raw_scrapes
            WHERE target_url = $1 AND expires_at > $2
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(url)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RawScrape::from))
    }

    async fn find_live_by_hash(
        &self,
        url: &str,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RawScrape>> {
        let row = sqlx::query_as::<_, ScrapeRow>(
            r#"
            SELECT * FROM raw_scrapes
            WHERE target_url = $1 AND content_hash = $2 AND expires_at > $3
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(url)
        .bind(content_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RawScrape::from))
    }

    async fn insert(&self, scrape: &RawScrape) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raw_scrapes
                (id, target_url, content_hash, raw_content, platform, fetched_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(scrape.id)
        .bind(&scrape.target_url)
        .bind(&scrape.content_hash)
        .bind(&scrape.raw_content)
        .bind(scrape.platform.to_string())
        .bind(scrape.fetched_at)
        .bind(scrape.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RawScrape>> {
        let row = sqlx::query_as::<_, ScrapeRow>("SELECT * FROM raw_scrapes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(RawScrape::from))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM raw_scrapes WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_scrapes")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn total_bytes(&self) -> Result<u64> {
        let n: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(OCTET_LENGTH(raw_content)), 0) FROM raw_scrapes")
                .fetch_one(&self.pool)
                .await?;
        Ok(n.max(0) as u64)
    }

    async fn oldest_fetched_at(&self) -> Result<Option<DateTime<Utc>>> {
        let t: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MIN(fetched_at) FROM raw_scrapes")
                .fetch_one(&self.pool)
                .await?;
        Ok(t)
    }
}
