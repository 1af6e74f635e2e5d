//! Valkey (Redis protocol) store backend.
//!
//! One multiplexed [`ConnectionManager`] is shared by all requests; it reconnects on its
//! own. Every command is bounded by `command_timeout` and attempted exactly once.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisError, RedisResult};
use std::{future::Future, time::Duration};
use tracing::{debug, instrument};

use super::{
    is_session_key, role_permissions_key, user_key, user_roles_key, SessionEntry, Store,
    StoreError, StoreResult, UserRecord, ROLE_PERMISSIONS_PREFIX, USER_PREFIX,
    USER_ROLES_PREFIX,
};

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[derive(Clone)]
pub struct ValkeyStore {
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl std::fmt::Debug for ValkeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyStore")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl ValkeyStore {
    /// Open a managed connection to `url` (`redis://host:port[/db]`).
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] if the URL is invalid or the server cannot be
    /// reached within `command_timeout`.
    pub async fn connect(url: &str, command_timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(command_timeout, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Unavailable(format!("connecting to {url} timed out")))??;
        debug!("connected to valkey");
        Ok(Self {
            manager,
            command_timeout,
        })
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Unavailable(format!("{op} timed out"))),
        }
    }

    async fn get_json(&self, key: &str) -> StoreResult<Option<UserRecord>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = self.run("GET", conn.get(key)).await?;
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let mut members: Vec<String> = self.run("SMEMBERS", conn.smembers(key)).await?;
        members.sort();
        Ok(members)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let mut keys: Vec<String> = self.run("KEYS", conn.keys(pattern)).await?;
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl Store for ValkeyStore {
    #[instrument(skip(self))]
    async fn get_user(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        self.get_json(&user_key(username)).await
    }

    #[instrument(skip(self, record))]
    async fn put_user(&self, username: &str, record: &UserRecord) -> StoreResult<()> {
        let key = user_key(username);
        let json = serde_json::to_string(record).map_err(|source| StoreError::Corrupt {
            key: key.clone(),
            source,
        })?;
        let roles_key = user_roles_key(username);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(&key, json)
            .ignore()
            .del(&roles_key)
            .ignore();
        if !record.roles.is_empty() {
            pipe.sadd(&roles_key, &record.roles).ignore();
        }

        let mut conn = self.manager.clone();
        let _: () = self.run("MULTI", pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, username: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let keys = vec![user_key(username), user_roles_key(username)];
        let _: () = self.run("DEL", conn.del(keys)).await?;
        Ok(())
    }

    async fn list_users(&self) -> StoreResult<Vec<String>> {
        // `user:*` also matches the `user:roles:*` sets.
        Ok(self
            .keys(&format!("{USER_PREFIX}*"))
            .await?
            .into_iter()
            .filter(|key| !key.starts_with(USER_ROLES_PREFIX))
            .filter_map(|key| key.strip_prefix(USER_PREFIX).map(str::to_string))
            .collect())
    }

    #[instrument(skip(self))]
    async fn user_roles(&self, username: &str) -> StoreResult<Vec<String>> {
        self.members(&user_roles_key(username)).await
    }

    #[instrument(skip(self))]
    async fn role_permissions(&self, role: &str) -> StoreResult<Vec<String>> {
        self.members(&role_permissions_key(role)).await
    }

    #[instrument(skip(self, permissions))]
    async fn set_role_permissions(&self, role: &str, permissions: &[String]) -> StoreResult<()> {
        let key = role_permissions_key(role);
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !permissions.is_empty() {
            pipe.sadd(&key, permissions.to_vec()).ignore();
        }

        let mut conn = self.manager.clone();
        let _: () = self.run("MULTI", pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_role(&self, role: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: () = self
            .run("DEL", conn.del(role_permissions_key(role)))
            .await?;
        Ok(())
    }

    async fn list_roles(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .keys(&format!("{ROLE_PERMISSIONS_PREFIX}*"))
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(ROLE_PERMISSIONS_PREFIX).map(str::to_string))
            .collect())
    }

    #[instrument(skip(self, token))]
    async fn put_session(&self, token: &str, username: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: () = self
            .run("SET", conn.set_ex(token, username, ttl.as_secs()))
            .await?;
        Ok(())
    }

    async fn session_user(&self, token: &str) -> StoreResult<Option<String>> {
        let mut conn = self.manager.clone();
        self.run("GET", conn.get(token)).await
    }

    async fn refresh_session(&self, token: &str, ttl: Duration) -> StoreResult<()> {
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let mut conn = self.manager.clone();
        let _: () = self.run("EXPIRE", conn.expire(token, seconds)).await?;
        Ok(())
    }

    async fn delete_session(&self, token: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: () = self.run("DEL", conn.del(token)).await?;
        Ok(())
    }

    async fn list_sessions(&self) -> StoreResult<Vec<SessionEntry>> {
        let mut sessions = Vec::new();
        for token in self.keys("*").await?.into_iter().filter(|key| is_session_key(key)) {
            let mut conn = self.manager.clone();
            // Expired between KEYS and GET: skip.
            let Some(username) = self.run::<Option<String>, _>("GET", conn.get(&token)).await?
            else {
                continue;
            };
            let ttl_seconds: i64 = self.run("TTL", conn.ttl(&token)).await?;
            sessions.push(SessionEntry {
                token,
                username,
                ttl_seconds,
            });
        }
        Ok(sessions)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: String = self
            .run("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "valkey"
    }
}
