//! User administration

use validator::Validate;

use super::auth::Passwords;
use crate::{
    config::BootstrapAdmin,
    error::{AppError, AppResult},
    models::user::{CreateUser, Role, UpdateUser, User},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    passwords: Passwords,
}

impl UsersService {
    pub fn new(repository: Repository, passwords: Passwords) -> Self {
        Self { repository, passwords }
    }

    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn create_user(&self, request: CreateUser) -> AppResult<User> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if self.repository.users.username_exists(&request.username, None).await? {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let password_hash = self.passwords.hash(&request.password).await?;
        let user = self
            .repository
            .users
            .create(
                &request.username,
                &request.name,
                &request.email,
                &password_hash,
                request.role,
            )
            .await?;

        tracing::info!(user_id = user.id, role = %user.role, "User created");
        Ok(user)
    }

    /// Update a user; the password is re-hashed only when one is supplied
    pub async fn update_user(&self, id: i32, request: UpdateUser) -> AppResult<User> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if self
            .repository
            .users
            .username_exists(&request.username, Some(id))
            .await?
        {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let password_hash = match request.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => Some(self.passwords.hash(password).await?),
            None => None,
        };

        let user = self
            .repository
            .users
            .update(
                id,
                &request.username,
                &request.name,
                &request.email,
                password_hash.as_deref(),
                request.role,
            )
            .await?;

        tracing::info!(user_id = id, password_changed = password_hash.is_some(), "User updated");
        Ok(user)
    }

    /// Delete a user. Administrators cannot delete their own account.
    pub async fn delete_user(&self, acting_user_id: i32, id: i32) -> AppResult<()> {
        ensure_not_self(acting_user_id, id)?;
        self.repository.users.delete(id).await?;
        tracing::info!(user_id = id, deleted_by = acting_user_id, "User deleted");
        Ok(())
    }

    /// Create the configured administrator when no account exists yet
    pub async fn ensure_bootstrap_admin(&self, admin: &BootstrapAdmin) -> AppResult<()> {
        if self.repository.users.count().await? > 0 {
            return Ok(());
        }

        let user = self
            .create_user(CreateUser {
                username: admin.username.clone(),
                name: admin.name.clone(),
                email: admin.email.clone(),
                password: admin.password.clone(),
                role: Role::Admin,
            })
            .await?;

        tracing::warn!(
            user_id = user.id,
            username = %user.username,
            "Created bootstrap administrator; change its password"
        );
        Ok(())
    }
}

fn ensure_not_self(acting_user_id: i32, id: i32) -> AppResult<()> {
    if acting_user_id == id {
        return Err(AppError::BusinessRule(
            "You cannot delete your own account".to_string(),
        ));
    }
    Ok(())
}
