//! SQLite-backed record store.

use crate::error::{PromptPixError, Result};
use crate::persistence::store::{ImageRecord, NewImageRecord, RecordId, RecordStore};
use crate::session::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{fs, path::PathBuf, str::FromStr, time::Duration};

/// Record store on a local SQLite database.
///
/// Owner isolation is enforced in every query by filtering on `owner_id`.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: Pool<Sqlite>,
}

impl SqliteRecordStore {
    /// Opens (creating if needed) the database and applies migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to `:memory:` is a separate database, so pin one.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(database_url, "record store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: NewImageRecord) -> Result<ImageRecord> {
        let created_at = Utc::now();
        let row = sqlx::query(
            "INSERT INTO image_records (owner_id, image_reference, prompt, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(record.owner_id.as_str())
        .bind(&record.image_reference)
        .bind(&record.prompt)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(ImageRecord {
            id: RecordId(row.try_get::<i64, _>(0)?),
            owner_id: record.owner_id,
            image_reference: record.image_reference,
            prompt: record.prompt,
            created_at,
        })
    }

    async fn list_by_owner(&self, owner_id: &UserId) -> Result<Vec<ImageRecord>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, image_reference, prompt, created_at
             FROM image_records
             WHERE owner_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PromptPixError::Store(format!("sqlite ping failed: {e}")))?;
        Ok(())
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ImageRecord> {
    Ok(ImageRecord {
        id: RecordId(row.try_get("id")?),
        owner_id: UserId(row.try_get("owner_id")?),
        image_reference: row.try_get("image_reference")?,
        prompt: row.try_get("prompt")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).map_err(|e| {
        PromptPixError::Store(format!(
            "failed to create parent directory '{}' for database url '{database_url}': {e}",
            parent.display()
        ))
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(owner: &str, prompt: &str) -> NewImageRecord {
        NewImageRecord {
            owner_id: UserId::new(owner),
            image_reference: format!("data:image/png;base64,{prompt}"),
            prompt: prompt.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id() {
        let store = SqliteRecordStore::connect("sqlite::memory:").await.expect("db");
        let record = store.insert(new_record("alice", "a cat")).await.expect("insert");
        assert!(record.id.0 > 0);
        assert_eq!(record.owner_id, UserId::new("alice"));
        assert_eq!(record.prompt, "a cat");
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first() {
        let store = SqliteRecordStore::connect("sqlite::memory:").await.expect("db");
        let first = store.insert(new_record("alice", "first")).await.expect("first");
        let second = store.insert(new_record("alice", "second")).await.expect("second");
        let third = store.insert(new_record("alice", "third")).await.expect("third");

        let records = store
            .list_by_owner(&UserId::new("alice"))
            .await
            .expect("list");
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn test_list_is_isolated_per_owner() {
        let store = SqliteRecordStore::connect("sqlite::memory:").await.expect("db");
        store.insert(new_record("alice", "mine")).await.expect("alice");
        store.insert(new_record("bob", "theirs")).await.expect("bob");

        let records = store
            .list_by_owner(&UserId::new("alice"))
            .await
            .expect("list");
        assert_eq!(records.len(), 1);
        assert!(records.iter().all(|r| r.owner_id == UserId::new("alice")));

        let empty = store
            .list_by_owner(&UserId::new("carol"))
            .await
            .expect("list");
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_health_check_succeeds_for_live_pool() {
        let store = SqliteRecordStore::connect("sqlite::memory:").await.expect("db");
        store.health_check().await.expect("health check");
    }

    #[tokio::test]
    async fn test_creates_database_file_when_missing() {
        let temp_root = tempfile::tempdir().expect("tempdir");
        let db_path = temp_root.path().join("nested").join("records.db");
        let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

        let store = SqliteRecordStore::connect(&database_url).await.expect("db");
        store.insert(new_record("alice", "persisted")).await.expect("insert");
        drop(store);

        assert!(db_path.exists(), "database file should exist: {}", db_path.display());

        let reopened = SqliteRecordStore::connect(&database_url).await.expect("reopen");
        let records = reopened
            .list_by_owner(&UserId::new("alice"))
            .await
            .expect("list");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_sqlite_path() {
        assert_eq!(sqlite_path("sqlite::memory:"), None);
        assert_eq!(sqlite_path("postgres://x"), None);
        assert_eq!(
            sqlite_path("sqlite://./data/records.db?mode=rwc"),
            Some(PathBuf::from("./data/records.db"))
        );
    }
}
