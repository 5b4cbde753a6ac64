//! [`SqlRepository`]: the reference backing store, `sqlx` against SQLite
//! (§4.8 "supplemented"). Two tables, `decisions` and `plans`, linked by
//! `decision_id`; atomicity is realized with a `sqlx::Transaction` wrapping
//! both inserts, exactly as §6's persisted layout specifies.
//!
//! We target SQLite by default (`sqlite://path/to.db`) so the service has
//! no external database dependency to run, the way the teacher's own tools
//! default to local, dependency-free storage wherever a full server isn't
//! required.

use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions};
use uuid::Uuid;

use super::{Repository, RepositoryError};
use crate::{
    context::RequestContext,
    domain::{Decision, Plan, VerdictPayload},
    prelude::*,
};

/// A repository backed by a `sqlx` SQLite connection pool.
pub struct SqlRepository {
    pool: SqlitePool,
}

impl SqlRepository {
    /// Connect to `database_url` and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("failed to connect to database")?;
        let repository = Self { pool };
        repository.ensure_schema().await?;
        Ok(repository)
    }

    /// Build a repository around an already-connected pool (used by tests
    /// against an in-memory SQLite database).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let repository = Self { pool };
        repository.ensure_schema().await?;
        Ok(repository)
    }

    /// Create the `decisions` and `plans` tables and their indexes if they
    /// don't already exist (§6's persisted layout).
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                id TEXT PRIMARY KEY,
                input TEXT NOT NULL,
                verdict TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_final INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create decisions table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_created_at ON decisions (created_at DESC)")
            .execute(&self.pool)
            .await
            .context("failed to create decisions.created_at index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plans (
                id TEXT PRIMARY KEY,
                decision_id TEXT NOT NULL REFERENCES decisions (id),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create plans table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_plans_decision_id ON plans (decision_id)")
            .execute(&self.pool)
            .await
            .context("failed to create plans.decision_id index")?;

        Ok(())
    }

    /// Insert a decision/plan pair inside an already-open transaction,
    /// returning an error that the caller can use to decide whether a
    /// conflict occurred.
    async fn insert(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        decision: &Decision,
        plan: &Plan,
    ) -> Result<(), sqlx::Error> {
        let verdict_json =
            serde_json::to_string(&decision.verdict).expect("VerdictPayload always serializes");

        sqlx::query(
            "INSERT INTO decisions (id, input, verdict, created_at, is_final) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(decision.id.to_string())
        .bind(&decision.input)
        .bind(verdict_json)
        .bind(crate::artifact::format_rfc3339_z(decision.created_at))
        .bind(decision.is_final)
        .execute(&mut **tx)
        .await?;

        sqlx::query("INSERT INTO plans (id, decision_id, content, created_at) VALUES (?, ?, ?, ?)")
            .bind(plan.id.to_string())
            .bind(plan.decision_id.to_string())
            .bind(&plan.content)
            .bind(crate::artifact::format_rfc3339_z(plan.created_at))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl Repository for SqlRepository {
    #[instrument(level = "debug", skip_all)]
    async fn save_artifacts(
        &self,
        _ctx: &RequestContext,
        mut decision: Decision,
        mut plan: Plan,
    ) -> Result<(Decision, Plan), RepositoryError> {
        plan.decision_id = decision.id;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| RepositoryError::Storage(error.into()))?;

        match Self::insert(&mut tx, &decision, &plan).await {
            Ok(()) => {
                tx.commit().await.map_err(|error| RepositoryError::Storage(error.into()))?;
                Ok((decision, plan))
            }
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                // Abort this transaction and retry once under a fresh id
                // (§9 design notes, resolved open question).
                drop(tx);
                let regenerated = Uuid::new_v4();
                decision.id = regenerated;
                plan.id = regenerated;
                plan.decision_id = regenerated;

                let mut retry_tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|error| RepositoryError::Storage(error.into()))?;
                match Self::insert(&mut retry_tx, &decision, &plan).await {
                    Ok(()) => {
                        retry_tx
                            .commit()
                            .await
                            .map_err(|error| RepositoryError::Storage(error.into()))?;
                        Ok((decision, plan))
                    }
                    Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                        Err(RepositoryError::Conflict)
                    }
                    Err(error) => Err(RepositoryError::Storage(error.into())),
                }
            }
            Err(error) => Err(RepositoryError::Storage(error.into())),
        }
    }

    async fn get_decision(&self, _ctx: &RequestContext, id: Uuid) -> Result<Decision, RepositoryError> {
        let row = sqlx::query("SELECT id, input, verdict, created_at, is_final FROM decisions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| RepositoryError::Storage(error.into()))?
            .ok_or(RepositoryError::NotFound)?;

        row_to_decision(&row)
    }

    async fn get_plan(&self, _ctx: &RequestContext, id: Uuid) -> Result<Plan, RepositoryError> {
        let row = sqlx::query("SELECT id, decision_id, content, created_at FROM plans WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| RepositoryError::Storage(error.into()))?
            .ok_or(RepositoryError::NotFound)?;

        row_to_plan(&row)
    }

    async fn get_plan_by_decision(
        &self,
        _ctx: &RequestContext,
        decision_id: Uuid,
    ) -> Result<Plan, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, decision_id, content, created_at FROM plans WHERE decision_id = ?",
        )
        .bind(decision_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| RepositoryError::Storage(error.into()))?
        .ok_or(RepositoryError::NotFound)?;

        row_to_plan(&row)
    }

    async fn ping(&self, _ctx: &RequestContext) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|error| RepositoryError::Storage(error.into()))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_decision(row: &sqlx::sqlite::SqliteRow) -> Result<Decision, RepositoryError> {
    let id: String = row.try_get("id").map_err(|error| RepositoryError::Storage(error.into()))?;
    let verdict_json: String =
        row.try_get("verdict").map_err(|error| RepositoryError::Storage(error.into()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|error| RepositoryError::Storage(error.into()))?;
    let is_final: bool =
        row.try_get("is_final").map_err(|error| RepositoryError::Storage(error.into()))?;

    Ok(Decision {
        id: parse_uuid(&id)?,
        created_at: parse_timestamp(&created_at)?,
        input: row.try_get("input").map_err(|error| RepositoryError::Storage(error.into()))?,
        verdict: serde_json::from_str::<VerdictPayload>(&verdict_json)
            .map_err(|error| RepositoryError::Storage(error.into()))?,
        is_final,
    })
}

fn row_to_plan(row: &sqlx::sqlite::SqliteRow) -> Result<Plan, RepositoryError> {
    let id: String = row.try_get("id").map_err(|error| RepositoryError::Storage(error.into()))?;
    let decision_id: String =
        row.try_get("decision_id").map_err(|error| RepositoryError::Storage(error.into()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|error| RepositoryError::Storage(error.into()))?;

    Ok(Plan {
        id: parse_uuid(&id)?,
        decision_id: parse_uuid(&decision_id)?,
        created_at: parse_timestamp(&created_at)?,
        content: row.try_get("content").map_err(|error| RepositoryError::Storage(error.into()))?,
    })
}

fn parse_uuid(value: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value).map_err(|error| RepositoryError::Storage(anyhow!(error)))
}

fn parse_timestamp(value: &str) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|error| RepositoryError::Storage(anyhow!(error)))
}
