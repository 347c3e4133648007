//! Respect tier storage (SQLite).

use crate::UserId;
use crate::error::{DbError, Result};
use crate::tier::Tier;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row as _, SqlitePool};
use std::path::Path;

/// Maps user ids to respect tiers. Unknown users read as [`Tier::Neutral`].
///
/// Reads come from many channels at once; writes are single-row upserts so
/// each user row changes atomically.
#[derive(Debug, Clone)]
pub struct TierStore {
    pool: SqlitePool,
}

impl TierStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database file and apply migrations.
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(DbError::SqliteConnect)?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Run the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|error| DbError::Migration(error.to_string()))?;
        Ok(())
    }

    pub async fn get_tier(&self, user_id: UserId) -> Result<Tier> {
        let row = sqlx::query("SELECT respect_tier FROM user_respect WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| DbError::Query(error.to_string()))?;

        let Some(row) = row else {
            return Ok(Tier::default());
        };

        let value: i64 = row
            .try_get("respect_tier")
            .map_err(|error| DbError::Query(error.to_string()))?;
        Ok(Tier::try_from(value)?)
    }

    pub async fn set_tier(&self, user_id: UserId, tier: Tier) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_respect (user_id, respect_tier) VALUES (?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET respect_tier = excluded.respect_tier, \
             updated_at = CURRENT_TIMESTAMP",
        )
        .bind(user_id.to_string())
        .bind(tier.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|error| DbError::Query(error.to_string()))?;

        tracing::info!(user_id, %tier, "respect tier updated");
        Ok(())
    }

    /// Validate a raw tier number, then store it.
    pub async fn set_tier_value(&self, user_id: UserId, value: i64) -> Result<Tier> {
        let tier = Tier::try_from(value)?;
        self.set_tier(user_id, tier).await?;
        Ok(tier)
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
