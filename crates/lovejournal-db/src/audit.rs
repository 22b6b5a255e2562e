//! Job run audit repository.
//!
//! `job_stats` holds the latest run per job and is overwritten on every run;
//! `job_history` is append-only and trimmed by the prune job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, Pool, Postgres, Row};
use tracing::debug;

use lovejournal_core::{AuditRepository, Error, Result, RunAudit};

const COLUMNS: &str = "run_id, job_name, status, started_at, finished_at, duration_ms, \
     accounts_processed, accounts_deleted, accounts_failed, images_deleted, \
     memories_deleted, records_affected, errors";

/// PostgreSQL implementation of AuditRepository.
#[derive(Clone)]
pub struct PgAuditRepository {
    pool: Pool<Postgres>,
    stats_table: String,
    history_table: String,
}

impl PgAuditRepository {
    pub fn new(
        pool: Pool<Postgres>,
        stats_table: impl Into<String>,
        history_table: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            stats_table: stats_table.into(),
            history_table: history_table.into(),
        }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Result<RunAudit> {
        let status: String = row.try_get("status")?;
        let errors: Json<Vec<String>> = row.try_get("errors")?;
        Ok(RunAudit {
            run_id: row.try_get("run_id")?,
            job_name: row.try_get("job_name")?,
            status: status.parse()?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            duration_ms: row.try_get("duration_ms")?,
            accounts_processed: row.try_get("accounts_processed")?,
            accounts_deleted: row.try_get("accounts_deleted")?,
            accounts_failed: row.try_get("accounts_failed")?,
            images_deleted: row.try_get("images_deleted")?,
            memories_deleted: row.try_get("memories_deleted")?,
            records_affected: row.try_get("records_affected")?,
            errors: errors.0,
        })
    }

    fn bind_audit<'q>(
        query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
        audit: &'q RunAudit,
    ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        query
            .bind(audit.run_id)
            .bind(&audit.job_name)
            .bind(audit.status.as_str())
            .bind(audit.started_at)
            .bind(audit.finished_at)
            .bind(audit.duration_ms)
            .bind(audit.accounts_processed)
            .bind(audit.accounts_deleted)
            .bind(audit.accounts_failed)
            .bind(audit.images_deleted)
            .bind(audit.memories_deleted)
            .bind(audit.records_affected)
            .bind(Json(&audit.errors))
    }
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn record_run(&self, audit: &RunAudit) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let upsert = format!(
            "INSERT INTO {} ({COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (job_name) DO UPDATE SET
                run_id = EXCLUDED.run_id,
                status = EXCLUDED.status,
                started_at = EXCLUDED.started_at,
                finished_at = EXCLUDED.finished_at,
                duration_ms = EXCLUDED.duration_ms,
                accounts_processed = EXCLUDED.accounts_processed,
                accounts_deleted = EXCLUDED.accounts_deleted,
                accounts_failed = EXCLUDED.accounts_failed,
                images_deleted = EXCLUDED.images_deleted,
                memories_deleted = EXCLUDED.memories_deleted,
                records_affected = EXCLUDED.records_affected,
                errors = EXCLUDED.errors",
            self.stats_table
        );
        Self::bind_audit(sqlx::query(&upsert), audit)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let append = format!(
            "INSERT INTO {} ({COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            self.history_table
        );
        Self::bind_audit(sqlx::query(&append), audit)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "audit",
            job = %audit.job_name,
            run_id = %audit.run_id,
            status = audit.status.as_str(),
            "Recorded job run"
        );
        Ok(())
    }

    async fn latest(&self, job_name: &str) -> Result<Option<RunAudit>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE job_name = $1",
            self.stats_table
        );
        let row = sqlx::query(&sql)
            .bind(job_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(Self::parse_row).transpose()
    }

    async fn history(&self, job_name: &str, limit: i64) -> Result<Vec<RunAudit>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {}
             WHERE job_name = $1
             ORDER BY started_at DESC
             LIMIT $2",
            self.history_table
        );
        let rows = sqlx::query(&sql)
            .bind(job_name)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.into_iter().map(Self::parse_row).collect()
    }

    async fn prune_history(&self, before: DateTime<Utc>) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE started_at < $1",
            self.history_table
        );
        let result = sqlx::query(&sql)
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
