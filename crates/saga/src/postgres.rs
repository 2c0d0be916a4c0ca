use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result,
    progress::SagaProgressStore,
    state::{SagaProgress, SagaStep, StepRecord},
};

/// PostgreSQL-backed saga progress store.
///
/// Each update locks the saga's row for the duration of a transaction, so
/// concurrent consumers never overwrite each other's history.
#[derive(Clone)]
pub struct PostgresProgressStore {
    pool: PgPool,
}

impl PostgresProgressStore {
    /// Creates a new PostgreSQL progress store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_progress(row: PgRow) -> Result<SagaProgress> {
        let current_step: serde_json::Value = row.try_get("current_step")?;
        let history: serde_json::Value = row.try_get("history")?;
        let attempts: i32 = row.try_get("attempts")?;

        Ok(SagaProgress {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            current_step: serde_json::from_value::<SagaStep>(current_step)?,
            attempts: u32::try_from(attempts).unwrap_or_default(),
            history: serde_json::from_value::<Vec<StepRecord>>(history)?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    /// Loads and locks the row of a saga inside `tx`.
    async fn lock(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
    ) -> Result<Option<SagaProgress>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, current_step, attempts, history, updated_at
            FROM saga_progress
            WHERE order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Self::row_to_progress).transpose()
    }

    async fn upsert(tx: &mut Transaction<'_, Postgres>, progress: &SagaProgress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saga_progress (order_id, current_step, attempts, history, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO UPDATE
            SET current_step = EXCLUDED.current_step,
                attempts = EXCLUDED.attempts,
                history = EXCLUDED.history,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(progress.order_id.as_uuid())
        .bind(serde_json::to_value(progress.current_step)?)
        .bind(i32::try_from(progress.attempts).unwrap_or(i32::MAX))
        .bind(serde_json::to_value(&progress.history)?)
        .bind(progress.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Applies `change` to the saga's progress under a row lock.
    async fn modify(
        &self,
        order_id: OrderId,
        change: impl FnOnce(&mut SagaProgress) + Send,
    ) -> Result<SagaProgress> {
        let mut tx = self.pool.begin().await?;

        // Make sure a row exists so concurrent first writers serialize on it.
        sqlx::query(
            r#"
            INSERT INTO saga_progress (order_id, current_step, attempts, history, updated_at)
            VALUES ($1, $2, 0, $3, $4)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(serde_json::to_value(SagaStep::Started)?)
        .bind(serde_json::to_value(&SagaProgress::new(order_id).history)?)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let mut progress = Self::lock(&mut tx, order_id)
            .await?
            .unwrap_or_else(|| SagaProgress::new(order_id));
        change(&mut progress);
        Self::upsert(&mut tx, &progress).await?;

        tx.commit().await?;
        Ok(progress)
    }
}

#[async_trait]
impl SagaProgressStore for PostgresProgressStore {
    async fn start(&self, order_id: OrderId) -> Result<SagaProgress> {
        self.modify(order_id, |_| {}).await
    }

    async fn load(&self, order_id: OrderId) -> Result<Option<SagaProgress>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, current_step, attempts, history, updated_at
            FROM saga_progress
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_progress).transpose()
    }

    async fn record(
        &self,
        order_id: OrderId,
        trigger: &str,
        step: SagaStep,
    ) -> Result<SagaProgress> {
        self.modify(order_id, |progress| progress.advance(trigger, step))
            .await
    }

    async fn record_attempts(&self, order_id: OrderId, attempts: u32) -> Result<SagaProgress> {
        self.modify(order_id, |progress| progress.record_attempts(attempts))
            .await
    }
}
