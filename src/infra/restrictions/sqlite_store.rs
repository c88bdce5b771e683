// SQLite-backed restriction store.
//
// Tables:
// - channel_restrictions: One row per restricted channel, keyed by channel id
// - bypass_roles: (guild_id, role_id) pairs that ignore every restriction

use crate::core::restrictions::{
    BypassRoleStore, ConfigStore, RestrictionRecord, RestrictionStore, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashSet;
use std::path::Path;

pub struct SqliteRestrictionStore {
    pool: Pool<Sqlite>,
}

impl SqliteRestrictionStore {
    /// Open (creating if needed) the database at `database_url` and migrate it.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new().connect(&conn_str).await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channel_restrictions (
                channel_id INTEGER PRIMARY KEY,
                guild_id INTEGER NOT NULL,
                allowed_mask INTEGER NOT NULL DEFAULT 0,
                blocked_mask INTEGER NOT NULL DEFAULT 0,
                redirect_channel_id INTEGER,
                preset TEXT,
                configured_by INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_channel_restrictions_guild
                ON channel_restrictions(guild_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bypass_roles (
                guild_id INTEGER NOT NULL,
                role_id INTEGER NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (guild_id, role_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn record_from_row(row: &SqliteRow) -> RestrictionRecord {
    RestrictionRecord {
        guild_id: row.get::<i64, _>("guild_id") as u64,
        channel_id: row.get::<i64, _>("channel_id") as u64,
        allowed_mask: row.get("allowed_mask"),
        blocked_mask: row.get("blocked_mask"),
        redirect_channel_id: row
            .get::<Option<i64>, _>("redirect_channel_id")
            .map(|id| id as u64),
        preset_name: row.get("preset"),
        configured_by: row.get::<Option<i64>, _>("configured_by").map(|id| id as u64),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at")),
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Database(other.to_string()),
    }
}

#[async_trait]
impl ConfigStore for SqliteRestrictionStore {
    async fn get_restriction(
        &self,
        channel_id: u64,
    ) -> Result<Option<RestrictionRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT channel_id, guild_id, allowed_mask, blocked_mask, redirect_channel_id,
                   preset, configured_by, created_at, updated_at
            FROM channel_restrictions
            WHERE channel_id = ?
            "#,
        )
        .bind(channel_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.as_ref().map(record_from_row))
    }
}

#[async_trait]
impl BypassRoleStore for SqliteRestrictionStore {
    async fn get_bypass_roles(&self, guild_id: u64) -> Result<HashSet<u64>, StoreError> {
        let rows = sqlx::query("SELECT role_id FROM bypass_roles WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows
            .iter()
            .map(|row| row.get::<i64, _>("role_id") as u64)
            .collect())
    }

    async fn add_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO bypass_roles (guild_id, role_id, added_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(guild_id as i64)
        .bind(role_id as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_bypass_role(&self, guild_id: u64, role_id: u64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM bypass_roles WHERE guild_id = ? AND role_id = ?")
            .bind(guild_id as i64)
            .bind(role_id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RestrictionStore for SqliteRestrictionStore {
    async fn save_restriction(&self, record: RestrictionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO channel_restrictions (
                channel_id, guild_id, allowed_mask, blocked_mask, redirect_channel_id,
                preset, configured_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(channel_id) DO UPDATE SET
                guild_id = excluded.guild_id,
                allowed_mask = excluded.allowed_mask,
                blocked_mask = excluded.blocked_mask,
                redirect_channel_id = excluded.redirect_channel_id,
                preset = excluded.preset,
                configured_by = excluded.configured_by,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.channel_id as i64)
        .bind(record.guild_id as i64)
        .bind(record.allowed_mask)
        .bind(record.blocked_mask)
        .bind(record.redirect_channel_id.map(|id| id as i64))
        .bind(record.preset_name)
        .bind(record.configured_by.map(|id| id as i64))
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn delete_restriction(&self, channel_id: u64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM channel_restrictions WHERE channel_id = ?")
            .bind(channel_id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_restrictions(&self, guild_id: u64) -> Result<Vec<RestrictionRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT channel_id, guild_id, allowed_mask, blocked_mask, redirect_channel_id,
                   preset, configured_by, created_at, updated_at
            FROM channel_restrictions
            WHERE guild_id = ?
            ORDER BY channel_id
            "#,
        )
        .bind(guild_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.iter().map(record_from_row).collect())
    }
}
