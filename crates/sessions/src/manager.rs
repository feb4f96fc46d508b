//! Session manager: expiry and renewal policy over a [`SessionStore`].

use std::sync::Arc;

use {
    serde::{Serialize, de::DeserializeOwned},
    stint_config::SessionsConfig,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::{
    error::{Result, SessionError},
    payload, policy,
    record::{SessionRecord, now_ms, token_prefix},
    store::SessionStore,
    store_sqlite::SqliteSessionStore,
};

/// Issues session tokens and enforces sliding expiry.
///
/// Read-modify-write operations (`update_session`, `renew_session`) are not
/// serialized per token; concurrent writers to one token are last-write-wins.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    expire_time: i64,
    renew_step: i64,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: &SessionsConfig) -> Self {
        Self {
            store,
            expire_time: config.expire_time_ms(),
            renew_step: config.renew_timestamp_ms(),
        }
    }

    /// Validate `config` and open the SQLite store at `config.storage_path`.
    pub async fn open(config: &SessionsConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let store = SqliteSessionStore::open(&config.storage_path).await?;
        info!(
            path = %config.storage_path.display(),
            expire_time_ms = config.expire_time,
            renew_timestamp_ms = config.renew_timestamp,
            "session manager ready"
        );
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Create a session holding `data` and return its token.
    pub async fn create_session<T: Serialize + ?Sized>(&self, data: Option<&T>) -> Result<String> {
        let expires_at = policy::initial_expiry(now_ms(), self.expire_time);
        let record = self
            .store
            .insert(payload::encode(data), expires_at)
            .await?
            .ok_or(SessionError::CreationFailed)?;

        #[cfg(feature = "metrics")]
        counter!("sessions_created_total").increment(1);

        debug!(token = token_prefix(&record.token), expires_at, "session created");
        Ok(record.token)
    }

    /// Return the session's data if it exists and has not expired.
    ///
    /// Read-only: expired rows are left in place and nothing is renewed.
    pub async fn retrieve_session<T: DeserializeOwned>(&self, token: &str) -> Result<Option<T>> {
        let record = self.fetch(token).await?;
        if !record.is_valid_at(now_ms()) {
            debug!(token = token_prefix(token), "session expired");
            return Err(SessionError::Expired);
        }
        Ok(payload::decode(record.payload.as_deref())?)
    }

    /// Replace the session's data and renew it, regardless of expiry.
    /// Returns `data` as given.
    pub async fn update_session<T: Serialize>(&self, token: &str, data: Option<T>) -> Result<Option<T>> {
        let now = now_ms();
        let record = self
            .fetch(token)
            .await?
            .with_payload(payload::encode(data.as_ref()))
            .renewed(now, self.renew_step);
        self.write_back(&record).await?;

        debug!(token = token_prefix(token), expires_at = record.expires_at, "session updated");
        Ok(data)
    }

    /// Renew the session, regardless of expiry. A renewal that is not due
    /// leaves the expiry unchanged and still succeeds.
    pub async fn renew_session(&self, token: &str) -> Result<bool> {
        let now = now_ms();
        let current = self.fetch(token).await?;
        let renewed = current.clone().renewed(now, self.renew_step);

        if renewed == current {
            debug!(token = token_prefix(token), "renewal not due");
            return Ok(true);
        }
        self.write_back(&renewed).await?;

        #[cfg(feature = "metrics")]
        counter!("sessions_renewed_total").increment(1);

        debug!(token = token_prefix(token), expires_at = renewed.expires_at, "session renewed");
        Ok(true)
    }

    /// Ensure the session is gone. Missing tokens are not an error.
    pub async fn remove_session(&self, token: &str) -> Result<bool> {
        let removed = self.store.delete_by_token(token).await?;

        #[cfg(feature = "metrics")]
        if removed {
            counter!("sessions_removed_total").increment(1);
        }

        debug!(token = token_prefix(token), removed, "session removed");
        Ok(true)
    }

    /// Delete every session with `expires_at < now`. Returns the number removed.
    pub async fn remove_expired_sessions(&self) -> Result<u64> {
        let deleted = self.store.delete_expired(now_ms()).await?;

        #[cfg(feature = "metrics")]
        counter!("sessions_reaped_total").increment(deleted);

        debug!(deleted, "expired sessions removed");
        Ok(deleted)
    }

    /// Number of stored sessions, expired ones included.
    pub async fn count_sessions(&self) -> Result<u64> {
        Ok(self.store.count().await?)
    }

    async fn fetch(&self, token: &str) -> Result<SessionRecord> {
        self.store
            .find_by_token(token)
            .await?
            .ok_or(SessionError::NotFound)
    }

    // A row deleted between fetch and write reads as not found.
    async fn write_back(&self, record: &SessionRecord) -> Result<()> {
        if self.store.save(record).await? {
            Ok(())
        } else {
            Err(SessionError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use {
        serde::Deserialize,
        serde_json::{Value, json},
    };

    use {super::*, crate::store_memory::MemorySessionStore};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_username: Option<String>,
    }

    fn config(expire_time: u64, renew_timestamp: u64) -> SessionsConfig {
        SessionsConfig {
            expire_time,
            renew_timestamp,
            ..Default::default()
        }
    }

    async fn sqlite_manager(expire_time: u64, renew_timestamp: u64) -> SessionManager {
        let store = SqliteSessionStore::open_in_memory().await.unwrap();
        SessionManager::new(Arc::new(store), &config(expire_time, renew_timestamp))
    }

    fn memory_manager(expire_time: u64, renew_timestamp: u64) -> SessionManager {
        SessionManager::new(
            Arc::new(MemorySessionStore::new()),
            &config(expire_time, renew_timestamp),
        )
    }

    /// Store whose rows vanish between lookup and write.
    struct VanishingStore(MemorySessionStore);

    #[async_trait::async_trait]
    impl SessionStore for VanishingStore {
        async fn insert(
            &self,
            payload: Option<String>,
            expires_at: i64,
        ) -> anyhow::Result<Option<SessionRecord>> {
            self.0.insert(payload, expires_at).await
        }

        async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<SessionRecord>> {
            self.0.find_by_token(token).await
        }

        async fn save(&self, _record: &SessionRecord) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn delete_by_token(&self, token: &str) -> anyhow::Result<bool> {
            self.0.delete_by_token(token).await
        }

        async fn delete_expired(&self, now: i64) -> anyhow::Result<u64> {
            self.0.delete_expired(now).await
        }

        async fn count(&self) -> anyhow::Result<u64> {
            self.0.count().await
        }
    }

    #[tokio::test]
    async fn test_write_to_vanished_row_is_not_found() {
        let sm = SessionManager::new(
            Arc::new(VanishingStore(MemorySessionStore::new())),
            &config(1_000, 6_000),
        );
        let token = insert_raw(&sm, &json!("stale"), now_ms() - 1_000).await;

        let err = sm
            .update_session(&token, Some(json!("new")))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound));

        let err = sm.renew_session(&token).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
    }

    /// Insert a row directly with the given expiry, bypassing policy.
    async fn insert_raw(manager: &SessionManager, data: &Value, expires_at: i64) -> String {
        manager
            .store()
            .insert(payload::encode(Some(data)), expires_at)
            .await
            .unwrap()
            .unwrap()
            .token
    }

    async fn expires_at(manager: &SessionManager, token: &str) -> i64 {
        manager
            .store()
            .find_by_token(token)
            .await
            .unwrap()
            .unwrap()
            .expires_at
    }

    #[tokio::test]
    async fn test_create_and_remove() {
        let sm = sqlite_manager(1_000, 6_000).await;
        let token = sm.create_session::<Value>(None).await.unwrap();
        assert!(uuid::Uuid::parse_str(&token).is_ok());
        assert!(sm.remove_session(&token).await.unwrap());
        assert_eq!(sm.count_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_retrieve_roundtrip() {
        let sm = sqlite_manager(1_000, 6_000).await;
        let user = User {
            username: "Scuro Guardiano".into(),
            old_username: None,
        };
        let token = sm.create_session(Some(&user)).await.unwrap();
        let back: User = sm.retrieve_session(&token).await.unwrap().unwrap();
        assert_eq!(back, user);
    }

    #[tokio::test]
    async fn test_create_without_data_retrieves_none() {
        let sm = sqlite_manager(1_000, 6_000).await;
        let token = sm.create_session::<Value>(None).await.unwrap();
        assert_eq!(sm.retrieve_session::<Value>(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_initial_expiry_uses_expire_time() {
        let sm = memory_manager(86_400_000, 3_600_000);
        let before = now_ms();
        let token = sm.create_session(Some(&json!(1))).await.unwrap();
        let after = now_ms();
        let exp = expires_at(&sm, &token).await;
        assert!(exp >= before + 86_400_000 && exp <= after + 86_400_000);
    }

    #[tokio::test]
    async fn test_update_replaces_payload() {
        let sm = sqlite_manager(1_000, 6_000).await;
        let token = sm
            .create_session(Some(&User {
                username: "Scuro Guardiano".into(),
                old_username: None,
            }))
            .await
            .unwrap();

        let new_user = User {
            username: "Guardiano <T extends Scuro>".into(),
            old_username: Some("Scuro Guardiano".into()),
        };
        let returned = sm.update_session(&token, Some(new_user)).await.unwrap().unwrap();

        let back: User = sm.retrieve_session(&token).await.unwrap().unwrap();
        assert_eq!(back, returned);
        assert_eq!(back.old_username.as_deref(), Some("Scuro Guardiano"));
        assert_eq!(back.username, "Guardiano <T extends Scuro>");
    }

    #[tokio::test]
    async fn test_update_to_none_clears_payload() {
        let sm = memory_manager(60_000, 6_000);
        let token = sm.create_session(Some(&json!({"a": 1}))).await.unwrap();
        assert_eq!(sm.update_session::<Value>(&token, None).await.unwrap(), None);
        assert_eq!(sm.retrieve_session::<Value>(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let sm = sqlite_manager(1_000, 6_000).await;
        let token = "00000000-0000-4000-8000-000000000000";
        assert!(matches!(
            sm.retrieve_session::<Value>(token).await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            sm.update_session(token, Some(json!(1))).await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(sm.renew_session(token).await, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn test_remove_unknown_token_succeeds() {
        let sm = sqlite_manager(1_000, 6_000).await;
        assert!(sm.remove_session("never-issued").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_read_keeps_row_until_reaped() {
        let sm = sqlite_manager(60_000, 6_000).await;
        let token = insert_raw(&sm, &json!({"1337": "1337"}), now_ms() - 10).await;

        assert!(matches!(
            sm.retrieve_session::<Value>(&token).await,
            Err(SessionError::Expired)
        ));
        // Still present: a second read is expired, not missing.
        assert!(matches!(
            sm.retrieve_session::<Value>(&token).await,
            Err(SessionError::Expired)
        ));
        assert_eq!(sm.remove_expired_sessions().await.unwrap(), 1);
        assert!(matches!(
            sm.retrieve_session::<Value>(&token).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_retrieve_does_not_renew() {
        let sm = memory_manager(1_000, 60_000);
        let token = sm.create_session(Some(&json!(1))).await.unwrap();
        let before = expires_at(&sm, &token).await;
        sm.retrieve_session::<Value>(&token).await.unwrap();
        assert_eq!(expires_at(&sm, &token).await, before);
    }

    #[tokio::test]
    async fn test_update_revives_expired_session() {
        let sm = sqlite_manager(60_000, 6_000).await;
        let token = insert_raw(&sm, &json!("old"), now_ms() - 10_000_000).await;

        sm.update_session(&token, Some(json!("new"))).await.unwrap();

        let exp = expires_at(&sm, &token).await;
        assert!(exp > now_ms());
        assert_eq!(
            sm.retrieve_session::<Value>(&token).await.unwrap(),
            Some(json!("new"))
        );
    }

    #[tokio::test]
    async fn test_update_with_zero_step_leaves_session_expired() {
        let sm = memory_manager(60_000, 0);
        let token = insert_raw(&sm, &json!("old"), now_ms() - 10).await;

        sm.update_session(&token, Some(json!("new"))).await.unwrap();
        assert!(matches!(
            sm.retrieve_session::<Value>(&token).await,
            Err(SessionError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_renew_revives_expired_session() {
        let sm = memory_manager(60_000, 6_000);
        let token = insert_raw(&sm, &json!(true), now_ms() - 10_000_000).await;

        assert!(sm.renew_session(&token).await.unwrap());
        assert_eq!(
            sm.retrieve_session::<Value>(&token).await.unwrap(),
            Some(json!(true))
        );
    }

    #[tokio::test]
    async fn test_renew_does_not_shorten_long_session() {
        let sm = sqlite_manager(86_400_000, 3_600_000).await;
        let token = sm.create_session(Some(&json!(1))).await.unwrap();
        let before = expires_at(&sm, &token).await;

        assert!(sm.renew_session(&token).await.unwrap());
        assert_eq!(expires_at(&sm, &token).await, before);
    }

    #[tokio::test]
    async fn test_repeated_renewal_never_regresses() {
        let sm = memory_manager(1_000, 6_000);
        let token = sm.create_session(Some(&json!(1))).await.unwrap();

        let mut last = expires_at(&sm, &token).await;
        for _ in 0..5 {
            sm.renew_session(&token).await.unwrap();
            let exp = expires_at(&sm, &token).await;
            assert!(exp >= last);
            last = exp;
        }
    }

    #[tokio::test]
    async fn test_reap_leaves_valid_sessions() {
        let sm = sqlite_manager(60_000, 6_000).await;
        let now = now_ms();
        for offset in [-3_000, -2_000, -1_000] {
            insert_raw(&sm, &json!(offset), now + offset).await;
        }
        let live = insert_raw(&sm, &json!("live"), now + 60_000).await;

        assert_eq!(sm.remove_expired_sessions().await.unwrap(), 3);
        assert_eq!(sm.count_sessions().await.unwrap(), 1);
        assert_eq!(
            sm.retrieve_session::<Value>(&live).await.unwrap(),
            Some(json!("live"))
        );
    }

    #[tokio::test]
    async fn test_reap_expired_batch() {
        let sm = sqlite_manager(1_000, 6_000).await;
        for _ in 0..5 {
            sm.create_session::<Value>(None).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1_001)).await;

        let token = sm.create_session::<Value>(None).await.unwrap();
        assert_eq!(sm.remove_expired_sessions().await.unwrap(), 5);
        assert_eq!(sm.retrieve_session::<Value>(&token).await.unwrap(), None);
        sm.remove_session(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_renewed_and_updated_sessions_survive_reap() {
        let sm = sqlite_manager(1_000, 6_000).await;
        let mut tokens = Vec::new();
        for _ in 0..5 {
            tokens.push(sm.create_session::<Value>(None).await.unwrap());
        }

        sm.renew_session(&tokens[0]).await.unwrap();
        sm.update_session(&tokens[4], Some(json!({"theanswer": 42})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1_001)).await;

        assert_eq!(sm.remove_expired_sessions().await.unwrap(), 3);
        assert_eq!(sm.retrieve_session::<Value>(&tokens[0]).await.unwrap(), None);
        assert_eq!(
            sm.retrieve_session::<Value>(&tokens[4]).await.unwrap(),
            Some(json!({"theanswer": 42}))
        );
    }

    #[tokio::test]
    async fn test_session_expires_after_lifetime() {
        let sm = sqlite_manager(1_000, 6_000).await;
        let token = sm.create_session(Some(&json!({"1337": "1337"}))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_001)).await;

        assert!(matches!(
            sm.retrieve_session::<Value>(&token).await,
            Err(SessionError::Expired)
        ));
        assert!(sm.remove_session(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_reported() {
        let sm = memory_manager(60_000, 6_000);
        let token = sm
            .store()
            .insert(Some("{not json".into()), now_ms() + 60_000)
            .await
            .unwrap()
            .unwrap()
            .token;
        assert!(matches!(
            sm.retrieve_session::<Value>(&token).await,
            Err(SessionError::Payload(_))
        ));
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SessionsConfig {
            storage_path: dir.path().join("sessions.db"),
            ..Default::default()
        };
        let sm = SessionManager::open(&cfg).await.unwrap();
        let token = sm.create_session(Some(&json!("persisted"))).await.unwrap();
        assert!(cfg.storage_path.exists());
        assert_eq!(
            sm.retrieve_session::<Value>(&token).await.unwrap(),
            Some(json!("persisted"))
        );
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let cfg = SessionsConfig {
            expire_time: u64::MAX,
            ..Default::default()
        };
        assert!(SessionManager::open(&cfg).await.is_err());
    }
}
