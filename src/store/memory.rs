//! In-process store backend.
//!
//! Mirrors the Valkey semantics the gateway depends on: empty sets do not exist,
//! session entries expire after their TTL, and listing only sees live keys.
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can advance time.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{
    role_permissions_key, user_key, user_roles_key, SessionEntry, Store, StoreError, StoreResult,
    UserRecord,
};

#[derive(Debug)]
struct SessionSlot {
    username: String,
    expires_at: Instant,
}

impl SessionSlot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, UserRecord>,
    user_roles: HashMap<String, BTreeSet<String>>,
    roles: HashMap<String, BTreeSet<String>>,
    sessions: HashMap<String, SessionSlot>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: Mutex<HashSet<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation touching `key` fail with [`StoreError::Unavailable`].
    ///
    /// Used to exercise the degraded paths without a real outage.
    pub fn mark_unavailable(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.unavailable.lock() {
            keys.insert(key.into());
        }
    }

    pub fn clear_unavailable(&self) {
        if let Ok(mut keys) = self.unavailable.lock() {
            keys.clear();
        }
    }

    fn check(&self, key: &str) -> StoreResult<()> {
        let blocked = self
            .unavailable
            .lock()
            .map(|keys| keys.contains(key) || keys.contains("*"))
            .unwrap_or(false);
        if blocked {
            Err(StoreError::Unavailable(format!("key {key} is unavailable")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        self.check(&user_key(username))?;
        Ok(self.inner.read().await.users.get(username).cloned())
    }

    async fn put_user(&self, username: &str, record: &UserRecord) -> StoreResult<()> {
        self.check(&user_key(username))?;
        self.check(&user_roles_key(username))?;
        let mut inner = self.inner.write().await;
        inner.users.insert(username.to_string(), record.clone());
        let roles: BTreeSet<String> = record.roles.iter().cloned().collect();
        if roles.is_empty() {
            inner.user_roles.remove(username);
        } else {
            inner.user_roles.insert(username.to_string(), roles);
        }
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> StoreResult<()> {
        self.check(&user_key(username))?;
        let mut inner = self.inner.write().await;
        inner.users.remove(username);
        inner.user_roles.remove(username);
        Ok(())
    }

    async fn list_users(&self) -> StoreResult<Vec<String>> {
        self.check("*")?;
        let mut users: Vec<String> = self.inner.read().await.users.keys().cloned().collect();
        users.sort();
        Ok(users)
    }

    async fn user_roles(&self, username: &str) -> StoreResult<Vec<String>> {
        self.check(&user_roles_key(username))?;
        Ok(self
            .inner
            .read()
            .await
            .user_roles
            .get(username)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn role_permissions(&self, role: &str) -> StoreResult<Vec<String>> {
        self.check(&role_permissions_key(role))?;
        Ok(self
            .inner
            .read()
            .await
            .roles
            .get(role)
            .map(|rules| rules.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_role_permissions(&self, role: &str, permissions: &[String]) -> StoreResult<()> {
        self.check(&role_permissions_key(role))?;
        let rules: BTreeSet<String> = permissions.iter().cloned().collect();
        let mut inner = self.inner.write().await;
        if rules.is_empty() {
            inner.roles.remove(role);
        } else {
            inner.roles.insert(role.to_string(), rules);
        }
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> StoreResult<()> {
        self.check(&role_permissions_key(role))?;
        self.inner.write().await.roles.remove(role);
        Ok(())
    }

    async fn list_roles(&self) -> StoreResult<Vec<String>> {
        self.check("*")?;
        let mut roles: Vec<String> = self.inner.read().await.roles.keys().cloned().collect();
        roles.sort();
        Ok(roles)
    }

    async fn put_session(&self, token: &str, username: &str, ttl: Duration) -> StoreResult<()> {
        self.check(token)?;
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        // Expired slots are otherwise only dropped when their own token is read again.
        inner.sessions.retain(|_, slot| slot.is_live(now));
        inner.sessions.insert(
            token.to_string(),
            SessionSlot {
                username: username.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn session_user(&self, token: &str) -> StoreResult<Option<String>> {
        self.check(token)?;
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        match inner.sessions.get(token) {
            Some(slot) if slot.is_live(now) => Ok(Some(slot.username.clone())),
            Some(_) => {
                inner.sessions.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn refresh_session(&self, token: &str, ttl: Duration) -> StoreResult<()> {
        self.check(token)?;
        let now = Instant::now();
        if let Some(slot) = self.inner.write().await.sessions.get_mut(token) {
            if slot.is_live(now) {
                slot.expires_at = now + ttl;
            }
        }
        Ok(())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        self.check(token)?;
        self.inner.write().await.sessions.remove(token);
        Ok(())
    }

    async fn list_sessions(&self) -> StoreResult<Vec<SessionEntry>> {
        self.check("*")?;
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        inner.sessions.retain(|_, slot| slot.is_live(now));
        let mut sessions: Vec<SessionEntry> = inner
            .sessions
            .iter()
            .map(|(token, slot)| SessionEntry {
                token: token.clone(),
                username: slot.username.clone(),
                ttl_seconds: i64::try_from(slot.expires_at.duration_since(now).as_secs())
                    .unwrap_or(i64::MAX),
            })
            .collect();
        sessions.sort_by(|a, b| a.token.cmp(&b.token));
        Ok(sessions)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check("*")
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
