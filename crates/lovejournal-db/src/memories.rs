//! Memory repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use lovejournal_core::{Error, Memory, MemoryRepository, Result};

const COLUMNS: &str =
    "id, user_id, title, text, date, images, location_name, latitude, longitude, created_at";

/// PostgreSQL implementation of MemoryRepository.
#[derive(Clone)]
pub struct PgMemoryRepository {
    pool: Pool<Postgres>,
    table: String,
}

impl PgMemoryRepository {
    pub fn new(pool: Pool<Postgres>, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Result<Memory> {
        Ok(Memory {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            text: row.try_get("text")?,
            date: row.try_get("date")?,
            images: row.try_get("images")?,
            location_name: row.try_get("location_name")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl MemoryRepository for PgMemoryRepository {
    async fn insert(&self, memory: &Memory) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            self.table
        );
        sqlx::query(&sql)
            .bind(memory.id)
            .bind(&memory.user_id)
            .bind(&memory.title)
            .bind(&memory.text)
            .bind(memory.date)
            .bind(&memory.images)
            .bind(&memory.location_name)
            .bind(memory.latitude)
            .bind(memory.longitude)
            .bind(memory.created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Memory>> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(Self::parse_row).transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Memory>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE user_id = $1 ORDER BY date DESC, created_at DESC",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.into_iter().map(Self::parse_row).collect()
    }

    async fn remove_image(&self, id: Uuid, reference: &str) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET images = array_remove(images, $2)
             WHERE id = $1 AND $2 = ANY(images)",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(reference)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
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

    async fn totals(&self) -> Result<(i64, i64)> {
        let sql = format!(
            "SELECT COUNT(*)::BIGINT AS memories,
                    COALESCE(SUM(cardinality(images)), 0)::BIGINT AS images
             FROM {}",
            self.table
        );
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok((row.try_get("memories")?, row.try_get("images")?))
    }
}
