//! SQLite-backed session store.

use std::{path::Path, time::Duration};

use {
    anyhow::Context,
    async_trait::async_trait,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tracing::debug,
};

use crate::{
    record::{SessionRecord, now_ms},
    store::{SessionStore, new_token},
};

/// Session rows in a `sessions` table, primary key `token`.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    token: String,
    payload: Option<String>,
    expires_at: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<SessionRow> for SessionRecord {
    fn from(r: SessionRow) -> Self {
        Self {
            token: r.token,
            payload: r.payload,
            expires_at: r.expires_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `sessions` table and its expiry index if they don't exist.
    pub async fn init(pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS sessions (
                token      TEXT PRIMARY KEY,
                payload    TEXT,
                expires_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions (expires_at)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Open (creating if needed) the database file at `path` and initialize the schema.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open session database {}", path.display()))?;

        Self::init(&pool).await?;
        debug!(path = %path.display(), "session database ready");
        Ok(Self::new(pool))
    }

    /// Single-connection in-memory database; contents vanish with the store.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(
        &self,
        payload: Option<String>,
        expires_at: i64,
    ) -> anyhow::Result<Option<SessionRecord>> {
        let now = now_ms();
        let row = sqlx::query_as::<_, SessionRow>(
            r#"INSERT INTO sessions (token, payload, expires_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               RETURNING token, payload, expires_at, created_at, updated_at"#,
        )
        .bind(new_token())
        .bind(&payload)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token, payload, expires_at, created_at, updated_at FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn save(&self, record: &SessionRecord) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE sessions SET payload = ?, expires_at = ?, updated_at = ? WHERE token = ?")
                .bind(&record.payload)
                .bind(record.expires_at)
                .bind(now_ms())
                .bind(&record.token)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_token(&self, token: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: i64) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
