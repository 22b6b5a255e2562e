//! Anniversary event and effect repositories.
//!
//! Both collections are subordinate to a user and are only ever listed or
//! wiped per user, so they share this module.

use async_trait::async_trait;
use sqlx::{types::Json, Pool, Postgres, Row};

use lovejournal_core::{
    AnniversaryEvent, Effect, EffectRepository, Error, EventRepository, Result,
};

/// PostgreSQL implementation of EventRepository.
#[derive(Clone)]
pub struct PgEventRepository {
    pool: Pool<Postgres>,
    table: String,
}

impl PgEventRepository {
    pub fn new(pool: Pool<Postgres>, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn insert(&self, event: &AnniversaryEvent) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, user_id, title, date, recurring, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.table
        );
        sqlx::query(&sql)
            .bind(event.id)
            .bind(&event.user_id)
            .bind(&event.title)
            .bind(event.date)
            .bind(event.recurring)
            .bind(event.created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<AnniversaryEvent>> {
        let sql = format!(
            "SELECT id, user_id, title, date, recurring, created_at
             FROM {} WHERE user_id = $1 ORDER BY date ASC",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| -> Result<_> {
                Ok(AnniversaryEvent {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    title: row.try_get("title")?,
                    date: row.try_get("date")?,
                    recurring: row.try_get("recurring")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE user_id = $1", self.table);
        let result = sqlx::query(&sql)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

/// PostgreSQL implementation of EffectRepository.
#[derive(Clone)]
pub struct PgEffectRepository {
    pool: Pool<Postgres>,
    table: String,
}

impl PgEffectRepository {
    pub fn new(pool: Pool<Postgres>, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }
}

#[async_trait]
impl EffectRepository for PgEffectRepository {
    async fn insert(&self, effect: &Effect) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, user_id, kind, settings, created_at)
             VALUES ($1, $2, $3, $4, $5)",
            self.table
        );
        sqlx::query(&sql)
            .bind(effect.id)
            .bind(&effect.user_id)
            .bind(&effect.kind)
            .bind(Json(&effect.settings))
            .bind(effect.created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Effect>> {
        let sql = format!(
            "SELECT id, user_id, kind, settings, created_at
             FROM {} WHERE user_id = $1 ORDER BY created_at ASC",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| -> Result<_> {
                let settings: Json<serde_json::Value> = row.try_get("settings")?;
                Ok(Effect {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    kind: row.try_get("kind")?,
                    settings: settings.0,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE user_id = $1", self.table);
        let result = sqlx::query(&sql)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
