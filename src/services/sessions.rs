//! Server-side sessions keyed by opaque tokens

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use tokio::sync::Mutex;

use crate::{
    error::{AppError, AppResult},
    models::{
        session::{FlashKind, FlashMessages, SessionData},
        user::Identity,
    },
};

/// Session persistence. Implementations serialize concurrent access to a
/// given token so overlapping requests cannot corrupt its state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a new session for the identity and return its token
    async fn create(&self, identity: &Identity) -> AppResult<String>;

    /// Live (unexpired) session for the token
    async fn load(&self, token: &str) -> AppResult<Option<SessionData>>;

    async fn destroy(&self, token: &str) -> AppResult<()>;

    async fn put_flash(&self, token: &str, kind: FlashKind, message: &str) -> AppResult<()>;

    /// Read and clear a flash slot
    async fn pop_flash(&self, token: &str, kind: FlashKind) -> AppResult<Option<String>>;
}

/// Pop both flash slots of a session
pub async fn pop_flashes(store: &dyn SessionStore, token: &str) -> AppResult<FlashMessages> {
    Ok(FlashMessages {
        success: store.pop_flash(token, FlashKind::Success).await?,
        error: store.pop_flash(token, FlashKind::Error).await?,
    })
}

/// 256 bits from the OS RNG, URL-safe base64
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn new_session(identity: &Identity, lifetime: Duration) -> AppResult<SessionData> {
    let lifetime = chrono::Duration::from_std(lifetime)
        .map_err(|e| AppError::Internal(format!("Invalid session lifetime: {}", e)))?;
    let now = Utc::now();
    Ok(SessionData {
        identity: identity.clone(),
        created_at: now,
        expires_at: now + lifetime,
    })
}

struct MemorySession {
    data: SessionData,
    flashes: HashMap<FlashKind, String>,
}

/// Sessions held in process memory
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, MemorySession>>>,
    lifetime: Duration,
}

impl MemorySessionStore {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            lifetime,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, identity: &Identity) -> AppResult<String> {
        let data = new_session(identity, self.lifetime)?;
        let token = generate_token();

        let mut sessions = self.sessions.lock().await;
        // Expired entries are dropped lazily here and on load
        let now = Utc::now();
        sessions.retain(|_, s| !s.data.is_expired(now));
        sessions.insert(
            token.clone(),
            MemorySession {
                data,
                flashes: HashMap::new(),
            },
        );
        Ok(token)
    }

    async fn load(&self, token: &str) -> AppResult<Option<SessionData>> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(token) {
            Some(session) if session.data.is_expired(Utc::now()) => {
                sessions.remove(token);
                Ok(None)
            }
            Some(session) => Ok(Some(session.data.clone())),
            None => Ok(None),
        }
    }

    async fn destroy(&self, token: &str) -> AppResult<()> {
        self.sessions.lock().await.remove(token);
        Ok(())
    }

    async fn put_flash(&self, token: &str, kind: FlashKind, message: &str) -> AppResult<()> {
        if let Some(session) = self.sessions.lock().await.get_mut(token) {
            session.flashes.insert(kind, message.to_string());
        }
        Ok(())
    }

    async fn pop_flash(&self, token: &str, kind: FlashKind) -> AppResult<Option<String>> {
        Ok(self
            .sessions
            .lock()
            .await
            .get_mut(token)
            .and_then(|session| session.flashes.remove(&kind)))
    }
}
