//! Redis-backed store.
//!
//! Reservation is a single `SET NX PX`. Attach and consume are Lua scripts so
//! the existence/emptiness check and the write happen inside one server-side
//! step. Every call is bounded by the configured command timeout; a timed out
//! or cancelled call is dropped, never retried here.

use super::{record_key, ttl_millis, AttachOutcome, SecretStore, StoreError, StoreResult};
use crate::config::RedisConfig;
use ::redis::aio::ConnectionManager;
use ::redis::{Client, Script};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// -1: absent, 0: already populated, 1: attached.
const ATTACH_SCRIPT: &str = r#"
local v = redis.call('GET', KEYS[1])
if not v then return -1 end
if v ~= '' then return 0 end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 1
"#;

/// Deletes the key whatever it holds; returns the value unless it was empty.
const CONSUME_SCRIPT: &str = r#"
local v = redis.call('GET', KEYS[1])
if not v then return false end
redis.call('DEL', KEYS[1])
if v == '' then return false end
return v
"#;

pub struct RedisStore {
    conn: ConnectionManager,
    attach: Script,
    consume: Script,
    command_timeout: Duration,
}

impl RedisStore {
    /// Open a managed connection. The manager reconnects on its own after
    /// transient failures.
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let conn = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout))??;

        Ok(Self {
            conn,
            attach: Script::new(ATTACH_SCRIPT),
            consume: Script::new(CONSUME_SCRIPT),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    async fn bounded<T, F>(&self, call: F) -> StoreResult<T>
    where
        F: Future<Output = ::redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, call).await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(StoreError::Timeout(self.command_timeout)),
        }
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretStore for RedisStore {
    async fn reserve_code(&self, code: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(record_key(code))
            .arg("")
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl));
        let reply: Option<String> = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn attach_payload(
        &self,
        code: &str,
        blob: &str,
        ttl: Duration,
    ) -> StoreResult<AttachOutcome> {
        let mut conn = self.conn.clone();
        let mut invocation = self.attach.key(record_key(code));
        invocation.arg(blob).arg(ttl_millis(ttl));
        let reply: i64 = self.bounded(invocation.invoke_async(&mut conn)).await?;
        match reply {
            1 => Ok(AttachOutcome::Attached),
            0 => Ok(AttachOutcome::Conflict),
            -1 => Ok(AttachOutcome::NotFound),
            other => Err(StoreError::UnexpectedReply(format!(
                "attach script returned {other}"
            ))),
        }
    }

    async fn consume_if_present(&self, code: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let invocation = self.consume.key(record_key(code));
        let reply: Option<String> = self
            .bounded(invocation.invoke_async(&mut conn))
            .await?;
        Ok(reply)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let cmd = ::redis::cmd("PING");
        let reply: String = self.bounded(cmd.query_async(&mut conn)).await?;
        debug!(reply = %reply, "Redis ping");
        Ok(())
    }
}
