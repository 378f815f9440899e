//! Sync tokens and dirty flags in SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    remote::SyncToken,
    storage::{DirtyIndex, DirtyTracker, SyncTokenStore},
};
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::PathBuf;
use tracing::{debug, error};

const GLOBAL_SCOPE: &str = "global";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sync_tokens (
        scope TEXT PRIMARY KEY,
        token TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS dirty_items (
        collection_uid TEXT NOT NULL,
        item_uid TEXT NOT NULL,
        marked_at INTEGER NOT NULL,
        PRIMARY KEY (collection_uid, item_uid)
    );
"#;

/// SQLite-backed [`SyncTokenStore`] and [`DirtyTracker`] for one account.
///
/// Token scopes are `global` for the collection-list token and
/// `collection:<uid>` for per-collection item tokens. Setting a token to
/// `None` deletes its row.
pub struct SqliteSyncStateStore {
    pool: SqlitePool,
}

impl SqliteSyncStateStore {
    /// Open (or create) the database at `db_path`.
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // SQLite URLs want forward slashes
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to connect to DB: {}", e)))?;

        Self::init(&pool).await?;
        debug!(path = ?db_path, "Initialized sync state store");

        Ok(Self { pool })
    }

    /// In-memory store (for testing).
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to connect to DB: {}", e)))?;

        Self::init(&pool).await?;
        Ok(Self { pool })
    }

    async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to create tables: {}", e)))?;
        Ok(())
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    fn collection_scope(collection_uid: &str) -> String {
        format!("collection:{}", collection_uid)
    }

    async fn get_token(&self, scope: &str) -> Result<Option<SyncToken>> {
        let row = sqlx::query("SELECT token FROM sync_tokens WHERE scope = ?")
            .bind(scope)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        row.map(|row| {
            row.try_get::<String, _>("token")
                .map(SyncToken::new)
                .map_err(|e| BridgeError::DatabaseError(e.to_string()))
        })
        .transpose()
    }

    async fn set_token(&self, scope: &str, token: Option<&SyncToken>) -> Result<()> {
        let result = match token {
            Some(token) => {
                sqlx::query(
                    r#"
                    INSERT INTO sync_tokens (scope, token, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(scope) DO UPDATE SET
                        token = excluded.token,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(scope)
                .bind(token.as_str())
                .bind(Self::now())
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query("DELETE FROM sync_tokens WHERE scope = ?")
                    .bind(scope)
                    .execute(&self.pool)
                    .await
            }
        };

        result.map_err(|e| {
            error!(scope, error = %e, "Failed to store sync token");
            BridgeError::DatabaseError(e.to_string())
        })?;

        debug!(scope, cleared = token.is_none(), "Stored sync token");
        Ok(())
    }
}

#[async_trait]
impl SyncTokenStore for SqliteSyncStateStore {
    async fn get_collection_token(&self, collection_uid: &str) -> Result<Option<SyncToken>> {
        self.get_token(&Self::collection_scope(collection_uid)).await
    }

    async fn set_collection_token(
        &self,
        collection_uid: &str,
        token: Option<&SyncToken>,
    ) -> Result<()> {
        self.set_token(&Self::collection_scope(collection_uid), token)
            .await
    }

    async fn get_global_token(&self) -> Result<Option<SyncToken>> {
        self.get_token(GLOBAL_SCOPE).await
    }

    async fn set_global_token(&self, token: Option<&SyncToken>) -> Result<()> {
        self.set_token(GLOBAL_SCOPE, token).await
    }

    async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM sync_tokens")
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        debug!("Cleared sync tokens");
        Ok(())
    }
}

#[async_trait]
impl DirtyTracker for SqliteSyncStateStore {
    async fn list_by_collection(&self) -> Result<DirtyIndex> {
        let rows = sqlx::query(
            "SELECT collection_uid, item_uid FROM dirty_items ORDER BY collection_uid, marked_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;

        let mut index = DirtyIndex::new();
        for row in rows {
            let collection_uid: String = row
                .try_get("collection_uid")
                .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
            let item_uid: String = row
                .try_get("item_uid")
                .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
            index.entry(collection_uid).or_default().insert(item_uid);
        }
        Ok(index)
    }

    async fn mark_dirty(&self, collection_uid: &str, item_uid: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dirty_items (collection_uid, item_uid, marked_at)
            VALUES (?, ?, ?)
            ON CONFLICT(collection_uid, item_uid) DO NOTHING
            "#,
        )
        .bind(collection_uid)
        .bind(item_uid)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self, collection_uid: &str, item_uid: &str) -> Result<()> {
        sqlx::query("DELETE FROM dirty_items WHERE collection_uid = ? AND item_uid = ?")
            .bind(collection_uid)
            .bind(item_uid)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn is_dirty(&self, collection_uid: &str, item_uid: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM dirty_items WHERE collection_uid = ? AND item_uid = ?")
            .bind(collection_uid)
            .bind(item_uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn clear_collection(&self, collection_uid: &str) -> Result<()> {
        sqlx::query("DELETE FROM dirty_items WHERE collection_uid = ?")
            .bind(collection_uid)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM dirty_items")
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))?;
        debug!("Cleared dirty items");
        Ok(())
    }
}
