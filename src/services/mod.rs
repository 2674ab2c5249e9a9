//! Business logic services

pub mod auth;
pub mod catalog;
pub mod loans;
pub mod redis;
pub mod sessions;
pub mod storage;
pub mod users;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::AppResult,
    repository::{CredentialStore, Ledger, PgLedger, Repository},
};

use self::sessions::SessionStore;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub loans: loans::LoansService,
    pub catalog: catalog::CatalogService,
    pub users: users::UsersService,
    pub sessions: Arc<dyn SessionStore>,
    pub repository: Repository,
}

impl Services {
    /// Wire services over PostgreSQL and the given session store
    pub async fn new(
        repository: Repository,
        sessions: Arc<dyn SessionStore>,
        config: &AppConfig,
    ) -> AppResult<Self> {
        let ledger = Arc::new(PgLedger::new(
            repository.pool.clone(),
            config.database.transaction_timeout_ms,
        ));
        let credentials = Arc::new(repository.users.clone());
        Self::assemble(repository, ledger, credentials, sessions, config).await
    }

    /// Wire services with explicit ledger and credential backends
    pub async fn assemble(
        repository: Repository,
        ledger: Arc<dyn Ledger>,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        config: &AppConfig,
    ) -> AppResult<Self> {
        let passwords = auth::Passwords::new(&config.auth)?;
        let storage = storage::FileStorage::new(&config.storage);

        Ok(Self {
            auth: auth::AuthService::new(
                credentials,
                sessions.clone(),
                passwords.clone(),
                config.session.lifetime(),
            )
            .await?,
            loans: loans::LoansService::new(ledger, config.database.transaction_timeout()),
            catalog: catalog::CatalogService::new(repository.clone(), storage),
            users: users::UsersService::new(repository.clone(), passwords),
            sessions,
            repository,
        })
    }
}
