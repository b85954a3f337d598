use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::errors::StoreError;
use crate::models::{Reviewable, ReviewableStatus, TargetRef};

const REVIEWABLE_COLUMNS: &str = "id, kind, status, created_by, reviewable_by_moderator, \
     reviewable_by_group, claimed_by, category, target_kind, target_id, payload, \
     created_at, updated_at";

/// PostgreSQL-backed store for production persistence.
///
/// The perform transaction locks the reviewable row with `FOR UPDATE`, so
/// concurrent performs on the same item serialize at the database.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store with the given connection string.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations complete");

        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn create(&self, reviewable: &Reviewable) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO reviewables (
                id, kind, status, created_by, reviewable_by_moderator,
                reviewable_by_group, claimed_by, category, target_kind, target_id,
                payload, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
            )
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                payload = EXCLUDED.payload,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(reviewable.id)
        .bind(&reviewable.kind)
        .bind(reviewable.status.as_i16())
        .bind(reviewable.created_by)
        .bind(reviewable.reviewable_by_moderator)
        .bind(reviewable.reviewable_by_group)
        .bind(reviewable.claimed_by)
        .bind(reviewable.category)
        .bind(reviewable.target.as_ref().map(|t| t.kind.as_str()))
        .bind(reviewable.target.as_ref().map(|t| t.id))
        .bind(Value::Object(reviewable.payload.clone()))
        .bind(reviewable.created_at)
        .bind(reviewable.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(id = %reviewable.id, "Saved reviewable");

        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Reviewable>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REVIEWABLE_COLUMNS} FROM reviewables WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| reviewable_from_row(&r)).transpose()
    }

    async fn list(&self, status: ReviewableStatus) -> Result<Vec<Reviewable>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEWABLE_COLUMNS} FROM reviewables \
             WHERE status = $1 ORDER BY created_at ASC"
        ))
        .bind(status.as_i16())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reviewable_from_row).collect()
    }

    async fn subject(&self, target: &TargetRef) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT doc FROM subjects WHERE kind = $1 AND id = $2")
            .bind(&target.kind)
            .bind(target.id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("doc")))
    }

    async fn put_subject(&self, target: &TargetRef, doc: Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subjects (kind, id, doc) VALUES ($1, $2, $3)
            ON CONFLICT (kind, id) DO UPDATE SET doc = EXCLUDED.doc
            "#,
        )
        .bind(&target.kind)
        .bind(target.id)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn begin(&self, id: Uuid) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {REVIEWABLE_COLUMNS} FROM reviewables WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let reviewable = match row {
            Some(row) => reviewable_from_row(&row)?,
            None => return Err(StoreError::Gone),
        };

        Ok(Box::new(PgTx { tx, reviewable }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
    reviewable: Reviewable,
}

#[async_trait]
impl StoreTx for PgTx {
    fn reviewable(&self) -> &Reviewable {
        &self.reviewable
    }

    async fn subject(&mut self, target: &TargetRef) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT doc FROM subjects WHERE kind = $1 AND id = $2")
            .bind(&target.kind)
            .bind(target.id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|r| r.get("doc")))
    }

    async fn put_subject(&mut self, target: &TargetRef, doc: Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subjects (kind, id, doc) VALUES ($1, $2, $3)
            ON CONFLICT (kind, id) DO UPDATE SET doc = EXCLUDED.doc
            "#,
        )
        .bind(&target.kind)
        .bind(target.id)
        .bind(doc)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_subject(&mut self, target: &TargetRef) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM subjects WHERE kind = $1 AND id = $2")
            .bind(&target.kind)
            .bind(target.id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn set_status(&mut self, to: ReviewableStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE reviewables SET status = $2, updated_at = now() WHERE id = $1")
            .bind(self.reviewable.id)
            .bind(to.as_i16())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        // Dropping an uncommitted sqlx transaction rolls it back.
        self.tx.commit().await?;
        Ok(())
    }
}

fn reviewable_from_row(row: &PgRow) -> Result<Reviewable, StoreError> {
    let status: i16 = row.get("status");
    let target_kind: Option<String> = row.get("target_kind");
    let target_id: Option<i64> = row.get("target_id");

    let target = match (target_kind, target_id) {
        (Some(kind), Some(id)) => Some(TargetRef { kind, id }),
        _ => None,
    };

    let payload = match row.get::<Value, _>("payload") {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    Ok(Reviewable {
        id: row.get("id"),
        kind: row.get("kind"),
        status: ReviewableStatus::from_i16(status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status value {status}")))?,
        created_by: row.get("created_by"),
        reviewable_by_moderator: row.get("reviewable_by_moderator"),
        reviewable_by_group: row.get("reviewable_by_group"),
        claimed_by: row.get("claimed_by"),
        category: row.get("category"),
        target,
        payload,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
