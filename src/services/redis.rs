//! Redis-backed session store

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use super::sessions::{generate_token, new_session, SessionStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        session::{FlashKind, SessionData},
        user::Identity,
    },
};

/// Sessions stored as `session:{token}` JSON values with a TTL. Flash slots
/// live in sibling keys and are popped with GETDEL, so each Redis command is
/// atomic for its key.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    lifetime: Duration,
}

fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

fn flash_key(token: &str, kind: FlashKind) -> String {
    format!("session:{}:flash:{}", token, kind.as_str())
}

fn redis_error(context: &str, e: redis::RedisError) -> AppError {
    AppError::Unavailable(format!("{}: {}", context, e))
}

impl RedisSessionStore {
    /// Connect and verify the server answers PING
    pub async fn new(url: &str, lifetime: Duration) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| redis_error("Failed to connect to Redis", e))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| redis_error("Redis connection test failed", e))?;

        Ok(Self { conn, lifetime })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, identity: &Identity) -> AppResult<String> {
        let data = new_session(identity, self.lifetime)?;
        let token = generate_token();
        let value = serde_json::to_string(&data)
            .map_err(|e| AppError::Internal(format!("Failed to serialize session: {}", e)))?;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(session_key(&token), value, self.lifetime.as_secs())
            .await
            .map_err(|e| redis_error("Failed to store session", e))?;

        Ok(token)
    }

    async fn load(&self, token: &str) -> AppResult<Option<SessionData>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(session_key(token))
            .await
            .map_err(|e| redis_error("Failed to load session", e))?;

        match value {
            Some(value) => {
                let data: SessionData = serde_json::from_str(&value)
                    .map_err(|e| AppError::Internal(format!("Corrupt session record: {}", e)))?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    async fn destroy(&self, token: &str) -> AppResult<()> {
        let keys = vec![
            session_key(token),
            flash_key(token, FlashKind::Success),
            flash_key(token, FlashKind::Error),
        ];
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| redis_error("Failed to delete session", e))?;
        Ok(())
    }

    async fn put_flash(&self, token: &str, kind: FlashKind, message: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();

        // The flash expires with the session it belongs to
        let ttl: i64 = conn
            .ttl(session_key(token))
            .await
            .map_err(|e| redis_error("Failed to read session TTL", e))?;
        if ttl <= 0 {
            return Ok(());
        }

        conn.set_ex::<_, _, ()>(flash_key(token, kind), message, ttl as u64)
            .await
            .map_err(|e| redis_error("Failed to store flash message", e))?;
        Ok(())
    }

    async fn pop_flash(&self, token: &str, kind: FlashKind) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GETDEL")
            .arg(flash_key(token, kind))
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| redis_error("Failed to pop flash message", e))
    }
}
