//! User repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};

use lovejournal_core::{Error, Result, UserCounts, UserRecord, UserRepository, UserStatus};

/// PostgreSQL implementation of UserRepository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
    table: String,
}

impl PgUserRepository {
    pub fn new(pool: Pool<Postgres>, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Result<UserRecord> {
        let status: String = row.try_get("status")?;
        Ok(UserRecord {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
            status: status.parse()?,
            removed_at: row.try_get("removed_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn upsert(&self, user: &UserRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, email, display_name, status, removed_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                display_name = EXCLUDED.display_name,
                status = EXCLUDED.status,
                removed_at = EXCLUDED.removed_at",
            self.table
        );
        sqlx::query(&sql)
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(user.status.as_str())
            .bind(user.removed_at)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<UserRecord>> {
        let sql = format!(
            "SELECT id, email, display_name, status, removed_at, created_at
             FROM {} WHERE id = $1",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(Self::parse_row).transpose()
    }

    async fn set_status(
        &self,
        id: &str,
        status: UserStatus,
        removed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET status = $2, removed_at = $3 WHERE id = $1",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(removed_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_removed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<UserRecord>> {
        let sql = format!(
            "SELECT id, email, display_name, status, removed_at, created_at
             FROM {}
             WHERE status = 'removed' AND removed_at IS NOT NULL AND removed_at <= $1
             ORDER BY removed_at ASC, id ASC
             LIMIT $2",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.into_iter().map(Self::parse_row).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_status(&self) -> Result<UserCounts> {
        let sql = format!(
            "SELECT status, COUNT(*)::BIGINT AS n FROM {} GROUP BY status",
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut counts = UserCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            match status.parse::<UserStatus>()? {
                UserStatus::Active => counts.active = n,
                UserStatus::Suspended => counts.suspended = n,
                UserStatus::Removed => counts.removed = n,
            }
        }
        Ok(counts)
    }
}
