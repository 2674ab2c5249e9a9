//! Administration endpoints: dashboard, book and user management

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::{Multipart, WithRejection};
use chrono::{DateTime, Months, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookForm, SaveBook},
        user::{CreateUser, UpdateUser, User},
        Dashboard,
    },
    services::catalog::Upload,
    AppState,
};

use super::AuthenticatedUser;

/// Uploads larger than this are rejected before reaching the handler
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Parsed admin book form
struct BookFormData {
    fields: HashMap<String, String>,
    cover: Option<Upload>,
    pdf: Option<Upload>,
}

async fn read_book_form(mut multipart: Multipart) -> AppResult<BookFormData> {
    let mut form = BookFormData {
        fields: HashMap::new(),
        cover: None,
        pdf: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "cover_image" | "pdf_file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", name, e)))?;

                // Browsers send an empty part when no file was chosen
                if file_name.is_empty() || bytes.is_empty() {
                    continue;
                }
                let upload = Some(Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
                if name == "cover_image" {
                    form.cover = upload;
                } else {
                    form.pdf = upload;
                }
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", name, e)))?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

fn required(fields: &HashMap<String, String>, name: &str) -> AppResult<String> {
    fields
        .get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required", name)))
}

fn optional(fields: &HashMap<String, String>, name: &str) -> String {
    fields.get(name).map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Build the book fields from a form.
///
/// `release_date` (RFC 3339) wins over `is_upcoming`, which schedules the
/// release one month after `now`; otherwise the book is released at `now`.
fn save_book_from_fields(fields: &HashMap<String, String>, now: DateTime<Utc>) -> AppResult<SaveBook> {
    let stock = match fields.get("stock").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse::<i32>()
            .ok()
            .filter(|stock| *stock >= 0)
            .ok_or_else(|| AppError::Validation(format!("Invalid stock: {}", raw)))?,
        None => 0,
    };

    let upcoming = matches!(
        fields.get("is_upcoming").map(|s| s.trim()),
        Some("on") | Some("true") | Some("1")
    );

    let release_date = match fields.get("release_date").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|e| AppError::Validation(format!("Invalid release_date: {}", e)))?,
        None if upcoming => now
            .checked_add_months(Months::new(1))
            .ok_or_else(|| AppError::Internal("Release date out of range".to_string()))?,
        None => now,
    };

    Ok(SaveBook {
        title: required(fields, "title")?,
        author: required(fields, "author")?,
        genre: optional(fields, "genre"),
        description: optional(fields, "description"),
        stock,
        release_date,
        cover_image_path: None,
        pdf_file_path: None,
    })
}

/// Admin dashboard
#[utoipa::path(
    get,
    path = "/admin/dashboard",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Counts and listings", body = Dashboard),
        (status = 403, description = "Administrator role required", body = crate::error::ErrorResponse)
    )
)]
pub async fn dashboard(State(state): State<AppState>) -> AppResult<Json<Dashboard>> {
    Ok(Json(state.services.catalog.dashboard().await?))
}

/// Create a book
#[utoipa::path(
    post,
    path = "/admin/books",
    tag = "admin",
    security(("bearer_auth" = [])),
    request_body(content = BookForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid form", body = crate::error::ErrorResponse),
        (status = 403, description = "Administrator role required", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Book>)> {
    let form = read_book_form(multipart).await?;
    let book = save_book_from_fields(&form.fields, Utc::now())?;

    let created = state
        .services
        .catalog
        .create_book(book, form.cover, form.pdf)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a book (stock is not editable)
#[utoipa::path(
    put,
    path = "/admin/books/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body(content = BookForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid form", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i32>, AppError>,
    multipart: Multipart,
) -> AppResult<Json<Book>> {
    let form = read_book_form(multipart).await?;
    let book = save_book_from_fields(&form.fields, Utc::now())?;

    let updated = state
        .services
        .catalog
        .update_book(id, book, form.cover, form.pdf)
        .await?;
    Ok(Json(updated))
}

/// Delete a book and its files
#[utoipa::path(
    delete,
    path = "/admin/books/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book has loan history", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get a user
#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<User>> {
    Ok(Json(state.services.users.get_user(id).await?))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/admin/users",
    tag = "admin",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid data", body = crate::error::ErrorResponse),
        (status = 409, description = "Username already exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    WithRejection(Json(request), _): WithRejection<Json<CreateUser>, AppError>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.create_user(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Update a user
#[utoipa::path(
    put,
    path = "/admin/users/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Username already exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i32>, AppError>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateUser>, AppError>,
) -> AppResult<Json<User>> {
    Ok(Json(state.services.users.update_user(id, request).await?))
}

/// Delete a user; administrators cannot delete themselves
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
        (status = 409, description = "User has loan history", body = crate::error::ErrorResponse),
        (status = 422, description = "Cannot delete own account", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    WithRejection(Path(id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<StatusCode> {
    state
        .services
        .users
        .delete_user(session.identity.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
