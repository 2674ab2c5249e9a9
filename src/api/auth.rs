//! Authentication endpoints

use axum::{extract::State, http::{HeaderMap, StatusCode}, Json};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::user::Identity,
    AppState,
};

use super::{bearer_token, AuthenticatedUser};

/// Login request
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response with the session token
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    /// Opaque session token, sent back as `Authorization: Bearer <token>`
    pub token: String,
    pub token_type: String,
    /// Session lifetime in seconds
    pub expires_in: u64,
    pub user: Identity,
}

/// Log in and open a new session
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid username or password", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(Json(request), _): WithRejection<Json<LoginRequest>, AppError>,
) -> AppResult<Json<LoginResponse>> {
    let previous = bearer_token(&headers);
    let session = state
        .services
        .auth
        .login(&request.username, &request.password, previous.as_deref())
        .await?;

    Ok(Json(LoginResponse {
        token: session.token,
        token_type: "Bearer".to_string(),
        expires_in: session.expires_in.as_secs(),
        user: session.identity,
    }))
}

/// Destroy the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Not logged in", body = crate::error::ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
) -> AppResult<StatusCode> {
    state.services.auth.logout(&session.token).await?;
    tracing::info!(user_id = session.identity.user_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// Identity attached to the current session
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current identity", body = Identity),
        (status = 401, description = "Not logged in", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(AuthenticatedUser(session): AuthenticatedUser) -> Json<Identity> {
    Json(session.identity)
}
