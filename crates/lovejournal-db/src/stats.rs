//! Aggregate count repository.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use lovejournal_core::{Error, GlobalStats, Result, StatsRepository, UserCounts, UserStats};

/// PostgreSQL implementation of StatsRepository.
#[derive(Clone)]
pub struct PgStatsRepository {
    pool: Pool<Postgres>,
    user_table: String,
    app_table: String,
}

impl PgStatsRepository {
    pub fn new(
        pool: Pool<Postgres>,
        user_table: impl Into<String>,
        app_table: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            user_table: user_table.into(),
            app_table: app_table.into(),
        }
    }
}

#[async_trait]
impl StatsRepository for PgStatsRepository {
    async fn put_user_stats(&self, stats: &UserStats) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (user_id, memory_count, image_count, event_count, computed_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id) DO UPDATE SET
                memory_count = EXCLUDED.memory_count,
                image_count = EXCLUDED.image_count,
                event_count = EXCLUDED.event_count,
                computed_at = EXCLUDED.computed_at",
            self.user_table
        );
        sqlx::query(&sql)
            .bind(&stats.user_id)
            .bind(stats.memory_count)
            .bind(stats.image_count)
            .bind(stats.event_count)
            .bind(stats.computed_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>> {
        let sql = format!(
            "SELECT user_id, memory_count, image_count, event_count, computed_at
             FROM {} WHERE user_id = $1",
            self.user_table
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(|row| -> Result<_> {
            Ok(UserStats {
                user_id: row.try_get("user_id")?,
                memory_count: row.try_get("memory_count")?,
                image_count: row.try_get("image_count")?,
                event_count: row.try_get("event_count")?,
                computed_at: row.try_get("computed_at")?,
            })
        })
        .transpose()
    }

    async fn delete_user_stats(&self, user_id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE user_id = $1", self.user_table);
        let result = sqlx::query(&sql)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_global_stats(&self, stats: &GlobalStats) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, active_users, suspended_users, removed_users,
                             memory_count, image_count, computed_at)
             VALUES (1, $1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                active_users = EXCLUDED.active_users,
                suspended_users = EXCLUDED.suspended_users,
                removed_users = EXCLUDED.removed_users,
                memory_count = EXCLUDED.memory_count,
                image_count = EXCLUDED.image_count,
                computed_at = EXCLUDED.computed_at",
            self.app_table
        );
        sqlx::query(&sql)
            .bind(stats.users.active)
            .bind(stats.users.suspended)
            .bind(stats.users.removed)
            .bind(stats.memory_count)
            .bind(stats.image_count)
            .bind(stats.computed_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn get_global_stats(&self) -> Result<Option<GlobalStats>> {
        let sql = format!(
            "SELECT active_users, suspended_users, removed_users,
                    memory_count, image_count, computed_at
             FROM {} WHERE id = 1",
            self.app_table
        );
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(|row| -> Result<_> {
            Ok(GlobalStats {
                users: UserCounts {
                    active: row.try_get("active_users")?,
                    suspended: row.try_get("suspended_users")?,
                    removed: row.try_get("removed_users")?,
                },
                memory_count: row.try_get("memory_count")?,
                image_count: row.try_get("image_count")?,
                computed_at: row.try_get("computed_at")?,
            })
        })
        .transpose()
    }
}
