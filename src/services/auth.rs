//! Authentication service: credential verification and session issuance

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use super::sessions::SessionStore;
use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::Identity,
    repository::CredentialStore,
};

/// Argon2id hashing with the configured cost
#[derive(Clone)]
pub struct Passwords {
    argon2: Argon2<'static>,
}

impl Passwords {
    pub fn new(config: &AuthConfig) -> AppResult<Self> {
        let params = Params::new(
            config.hash_memory_kib,
            config.hash_iterations,
            config.hash_parallelism,
            None,
        )
        .map_err(|e| AppError::Internal(format!("Invalid argon2 parameters: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password into a PHC string with a fresh salt
    pub async fn hash(&self, password: &str) -> AppResult<String> {
        let argon2 = self.argon2.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    /// Compare a password with a stored PHC string. Malformed hashes never match.
    pub async fn verify(&self, password: &str, password_hash: &str) -> AppResult<bool> {
        let argon2 = self.argon2.clone();
        let password = password.to_string();
        let password_hash = password_hash.to_string();
        tokio::task::spawn_blocking(move || match PasswordHash::new(&password_hash) {
            Ok(parsed) => argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!("Stored password hash is not a valid PHC string: {}", e);
                false
            }
        })
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
    }
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: String,
    pub identity: Identity,
    pub expires_in: Duration,
}

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    passwords: Passwords,
    /// Verified in place of a stored hash when the username is unknown
    dummy_hash: Arc<str>,
    session_lifetime: Duration,
}

impl AuthService {
    pub async fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        passwords: Passwords,
        session_lifetime: Duration,
    ) -> AppResult<Self> {
        let dummy_hash = passwords.hash("not-a-real-password").await?;
        Ok(Self {
            credentials,
            sessions,
            passwords,
            dummy_hash: dummy_hash.into(),
            session_lifetime,
        })
    }

    /// Check a username/password pair.
    ///
    /// Unknown users and wrong passwords produce the same error after the same
    /// amount of hashing work.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<Identity> {
        let credentials = self.credentials.find_credentials(username).await?;

        let stored_hash = credentials
            .as_ref()
            .map(|c| c.password_hash.as_str())
            .unwrap_or(&*self.dummy_hash);
        let password_valid = self.passwords.verify(password, stored_hash).await?;

        match credentials {
            Some(credentials) if password_valid => Ok(Identity::from(&credentials)),
            _ => Err(AppError::invalid_credentials()),
        }
    }

    /// Authenticate and issue a fresh session. A session the caller already
    /// held is destroyed first.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        previous_token: Option<&str>,
    ) -> AppResult<LoginSession> {
        let identity = match self.authenticate(username, password).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::info!(username = %username, "Login refused");
                return Err(e);
            }
        };

        if let Some(previous) = previous_token {
            self.sessions.destroy(previous).await?;
        }
        let token = self.sessions.create(&identity).await?;

        tracing::info!(user_id = identity.user_id, role = %identity.role, "User logged in");

        Ok(LoginSession {
            token,
            identity,
            expires_in: self.session_lifetime,
        })
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        self.sessions.destroy(token).await
    }
}
