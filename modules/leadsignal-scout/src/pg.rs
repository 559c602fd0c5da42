// Postgres-backed signal storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use leadsignal_common::{ExtractedSignal, SignalAction};

use crate::error::Result;
use crate::store::SignalStore;

pub struct PgSignalStore {
    pool: PgPool,
}

/// A row from the extracted_signals table. Action is stored as text and
/// parsed leniently on the way out.
#[derive(Debug, sqlx::FromRow)]
struct SignalRow {
    id: Uuid,
    target_id: Uuid,
    definition_id: String,
    label: String,
    confidence: i16,
    evidence_snippet: String,
    score_contribution: i32,
    action: String,
    source_scrape_id: Uuid,
    detected_at: DateTime<Utc>,
}

impl From<SignalRow> for ExtractedSignal {
    fn from(r: SignalRow) -> Self {
        ExtractedSignal {
            id: r.id,
            target_id: r.target_id,
            definition_id: r.definition_id,
            label: r.label,
            confidence: r.confidence.clamp(0, u8::MAX as i16) as u8,
            evidence_snippet: r.evidence_snippet,
            score_contribution: r.score_contribution,
            action: SignalAction::from_str_loose(&r.action),
            source_scrape_id: r.source_scrape_id,
            detected_at: r.detected_at,
        }
    }
}

impl PgSignalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run idempotent schema migrations. The unique constraint on
    /// `(target_id, definition_id)` is what makes upserts converge instead
    /// of stacking duplicate detections.
    pub async fn migrate(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS extracted_signals (
                id UUID PRIMARY KEY,
                target_id UUID NOT NULL,
                definition_id TEXT NOT NULL,
                label TEXT NOT NULL,
                confidence SMALLINT NOT NULL,
                evidence_snippet TEXT NOT NULL,
                score_contribution INTEGER NOT NULL,
                action TEXT NOT NULL,
                source_scrape_id UUID NOT NULL,
                detected_at TIMESTAMPTZ NOT NULL,
                UNIQUE (target_id, definition_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_extracted_signals_target
                ON extracted_signals (target_id)",
        ];

        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        info!("Signal store schema ready");
        Ok(())
    }
}

#[async_trait]
impl SignalStore for PgSignalStore {
    async fn upsert_batch(&self, signals: &[ExtractedSignal]) -> Result<()> {
        if signals.is_empty() {
            return Ok(());
        }

        // One transaction for the whole batch: a job's signals land together
        // or not at all.
        let mut tx = self.pool.begin().await?;
        for signal in signals {
            sqlx::query(
                r#"
                INSERT INTO extracted_signals
                    (id, target_id, definition_id, label, confidence, evidence_snippet,
                     score_contribution, action, source_scrape_id, detected_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (target_id, definition_id) DO UPDATE SET
                    label = EXCLUDED.label,
                    confidence = EXCLUDED.confidence,
                    evidence_snippet = EXCLUDED.evidence_snippet,
                    score_contribution = EXCLUDED.score_contribution,
                    action = EXCLUDED.action,
                    source_scrape_id = EXCLUDED.source_scrape_id,
                    detected_at = EXCLUDED.detected_at
                "#,
            )
            .bind(signal.id)
            .bind(signal.target_id)
            .bind(&signal.definition_id)
            .bind(&signal.label)
            .bind(signal.confidence as i16)
            .bind(&signal.evidence_snippet)
            .bind(signal.score_contribution)
            .bind(signal.action.to_string())
            .bind(signal.source_scrape_id)
            .bind(signal.detected_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn signals_for_target(&self, target_id: Uuid) -> Result<Vec<ExtractedSignal>> {
        let rows = sqlx::query_as::<_, SignalRow>(
            r#"
            SELECT * FROM extracted_signals
            WHERE target_id = $1
            ORDER BY definition_id
            "#,
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ExtractedSignal::from).collect())
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM extracted_signals")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}
