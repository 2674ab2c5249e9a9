//! API handlers for the lending REST endpoints

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod guard;
pub mod health;
pub mod loans;
pub mod openapi;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::{error::AppError, models::user::Identity};

/// Session resolved by [`guard::require_authenticated`] for the current request
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub token: String,
    pub identity: Identity,
}

/// Extractor for the authenticated session.
///
/// Only available on routes behind the authentication guard.
pub struct AuthenticatedUser(pub CurrentSession);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or_else(|| AppError::Authentication("Login required".to_string()))
    }
}

/// Session token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}
