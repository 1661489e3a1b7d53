//! SQLite implementation of the gallery stores.
//!
//! Uses [`sqlx`] with the `sqlite` feature. The schema lives in
//! `./migrations` and is embedded at compile time; it is applied once at
//! startup by [`Database::migrate`], never from a request handler.
//!
//! Queries use the runtime-checked `sqlx::query` form so no `DATABASE_URL`
//! is needed at build time.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::debug;

use super::models::{encode_timestamp, ItemRow, LikeRow, ProfileRow, DEFAULT_CREDITS, DEFAULT_TIER};
use super::{GeneratedItem, ItemStore, Like, LikeStore, Profile, ProfileStore};

const INCREMENT_LIKES: &str = "UPDATE generated_items SET likes_count = likes_count + 1 WHERE id = ?1";
const DECREMENT_LIKES: &str =
    "UPDATE generated_items SET likes_count = MAX(likes_count - 1, 0) WHERE id = ?1";

/// SQLite-backed store for items, likes and profiles.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `url`.
    ///
    /// `url` is a sqlx SQLite URL such as `"sqlite://emoji-gallery.db"`, or
    /// `"sqlite::memory:"` for tests. An in-memory database lives only as long
    /// as its connection, so it is kept on a single connection that is never
    /// recycled.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        debug!(url = %url, in_memory, "Opened database pool");
        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Cheap liveness check used by the health endpoint.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ── ItemStore ─────────────────────────────────────────────────────────────────

impl ItemStore for Database {
    async fn insert_item(&self, item: &GeneratedItem) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO generated_items (id, prompt, image_url, creator_user_id, likes_count, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&item.id)
        .bind(&item.prompt)
        .bind(&item.image_url)
        .bind(&item.creator_user_id)
        .bind(item.likes_count)
        .bind(encode_timestamp(&item.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<GeneratedItem>, sqlx::Error> {
        let row: Option<ItemRow> = sqlx::query_as(
            "SELECT id, prompt, image_url, creator_user_id, likes_count, created_at \
             FROM generated_items WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(GeneratedItem::try_from).transpose()
    }

    async fn list_items(&self) -> Result<Vec<GeneratedItem>, sqlx::Error> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT id, prompt, image_url, creator_user_id, likes_count, created_at \
             FROM generated_items ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(GeneratedItem::try_from).collect()
    }
}

// ── LikeStore ─────────────────────────────────────────────────────────────────

impl LikeStore for Database {
    async fn find_like(&self, user_id: &str, item_id: &str) -> Result<Option<Like>, sqlx::Error> {
        let row: Option<LikeRow> = sqlx::query_as(
            "SELECT user_id, item_id, created_at FROM likes WHERE user_id = ?1 AND item_id = ?2",
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Like::try_from).transpose()
    }

    async fn insert_like(&self, user_id: &str, item_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO likes (user_id, item_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(user_id)
            .bind(item_id)
            .bind(encode_timestamp(&Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_like(&self, user_id: &str, item_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM likes WHERE user_id = ?1 AND item_id = ?2")
            .bind(user_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn increment_likes(&self, item_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(INCREMENT_LIKES)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn decrement_likes(&self, item_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(DECREMENT_LIKES)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn like_atomic(&self, user_id: &str, item_id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO likes (user_id, item_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(encode_timestamp(&Utc::now()))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            sqlx::query(INCREMENT_LIKES)
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn unlike_atomic(&self, user_id: &str, item_id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM likes WHERE user_id = ?1 AND item_id = ?2")
            .bind(user_id)
            .bind(item_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;

        if deleted {
            sqlx::query(DECREMENT_LIKES)
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn count_likes(&self, item_id: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM likes WHERE item_id = ?1")
            .bind(item_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// ── ProfileStore ──────────────────────────────────────────────────────────────

impl ProfileStore for Database {
    async fn get_or_create_profile(&self, user_id: &str) -> Result<Profile, sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO profiles (user_id, credits, tier, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(DEFAULT_CREDITS)
        .bind(DEFAULT_TIER)
        .bind(encode_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        let row: ProfileRow = sqlx::query_as(
            "SELECT user_id, credits, tier, created_at FROM profiles WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Profile::try_from(row)
    }
}
