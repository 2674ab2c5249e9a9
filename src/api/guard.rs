//! Route guards: an authenticated session, then optionally the admin role

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::{bearer_token, CurrentSession};
use crate::{error::AppError, AppState};

/// Resolve the bearer token to a live session and attach it to the request
pub async fn require_authenticated(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::Authentication("Login required".to_string()))?;

    let session = state
        .services
        .sessions
        .load(&token)
        .await?
        .ok_or_else(|| AppError::Authentication("Session expired or invalid".to_string()))?;

    request.extensions_mut().insert(CurrentSession {
        token,
        identity: session.identity,
    });

    Ok(next.run(request).await)
}

/// Must be layered inside [`require_authenticated`]
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let session = request
        .extensions()
        .get::<CurrentSession>()
        .ok_or_else(|| AppError::Authentication("Login required".to_string()))?;

    if !session.identity.role.is_admin() {
        tracing::warn!(
            user_id = session.identity.user_id,
            path = %request.uri().path(),
            "Unauthorized admin access attempt"
        );
        return Err(AppError::Authorization(
            "Administrator role required".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
