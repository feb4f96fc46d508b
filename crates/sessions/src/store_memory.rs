//! In-process session store.

use std::collections::HashMap;

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{
    policy,
    record::{SessionRecord, now_ms},
    store::{SessionStore, new_token},
};

/// `HashMap`-backed store. Rows live as long as the value does.
#[derive(Default)]
pub struct MemorySessionStore {
    rows: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(
        &self,
        payload: Option<String>,
        expires_at: i64,
    ) -> anyhow::Result<Option<SessionRecord>> {
        let now = now_ms();
        let record = SessionRecord {
            token: new_token(),
            payload,
            expires_at,
            created_at: now,
            updated_at: now,
        };
        let mut rows = self.rows.write().await;
        if rows.contains_key(&record.token) {
            anyhow::bail!("duplicate session token");
        }
        rows.insert(record.token.clone(), record.clone());
        Ok(Some(record))
    }

    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<SessionRecord>> {
        Ok(self.rows.read().await.get(token).cloned())
    }

    async fn save(&self, record: &SessionRecord) -> anyhow::Result<bool> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&record.token) else {
            return Ok(false);
        };
        row.payload = record.payload.clone();
        row.expires_at = record.expires_at;
        row.updated_at = now_ms();
        Ok(true)
    }

    async fn delete_by_token(&self, token: &str) -> anyhow::Result<bool> {
        Ok(self.rows.write().await.remove(token).is_some())
    }

    async fn delete_expired(&self, now: i64) -> anyhow::Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, row| !policy::is_reapable(row.expires_at, now));
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.rows.read().await.len() as u64)
    }
}
