//! Catalog endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::WithRejection;

use crate::{
    error::{AppError, AppResult},
    models::book::{BookDetail, BookShort},
    services::sessions::pop_flashes,
    AppState,
};

use super::AuthenticatedUser;

/// Released books, ordered by title
#[utoipa::path(
    get,
    path = "/catalog",
    tag = "catalog",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Released books", body = Vec<BookShort>)
    )
)]
pub async fn list_catalog(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
) -> AppResult<Json<Vec<BookShort>>> {
    Ok(Json(state.services.catalog.released_books().await?))
}

/// Books with a future release date, soonest first
#[utoipa::path(
    get,
    path = "/upcoming",
    tag = "catalog",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Upcoming books", body = Vec<BookShort>)
    )
)]
pub async fn list_upcoming(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
) -> AppResult<Json<Vec<BookShort>>> {
    Ok(Json(state.services.catalog.upcoming_books().await?))
}

/// Book detail with the caller's loan flag
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "catalog",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book detail", body = BookDetail),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    WithRejection(Path(id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<BookDetail>> {
    let mut detail = state
        .services
        .catalog
        .book_detail(session.identity.user_id, id)
        .await?;
    // Flash slots are read-once; only consume them for a page that renders
    detail.flash = pop_flashes(state.services.sessions.as_ref(), &session.token).await?;
    Ok(Json(detail))
}
