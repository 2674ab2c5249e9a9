//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::session::FlashMessages;

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub genre: String,
    /// Copies currently available for loan, never negative
    pub stock: i32,
    pub description: String,
    /// Generated filename of the stored cover image
    pub cover_image_path: Option<String>,
    /// Generated filename of the stored PDF
    pub pdf_file_path: Option<String>,
    pub release_date: DateTime<Utc>,
    /// `release_date <= now`, computed by the query
    pub is_available: bool,
}

/// Short book representation for catalog listings
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub cover_image_path: Option<String>,
    pub release_date: DateTime<Utc>,
}

/// Book detail page payload
#[derive(Debug, Serialize, ToSchema)]
pub struct BookDetail {
    pub book: Book,
    /// Whether the current user holds an active loan of this book
    pub user_has_loan: bool,
    pub flash: FlashMessages,
}

/// Book fields collected from the admin form
#[derive(Debug, Clone, Default)]
pub struct SaveBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub description: String,
    /// Initial stock, only honoured on creation
    pub stock: i32,
    pub release_date: DateTime<Utc>,
    pub cover_image_path: Option<String>,
    pub pdf_file_path: Option<String>,
}

/// Multipart form accepted by the admin book endpoints (documentation only)
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct BookForm {
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub description: Option<String>,
    /// Ignored on update
    pub stock: Option<i32>,
    /// RFC 3339; takes precedence over `is_upcoming`
    pub release_date: Option<String>,
    /// "on" or "true" schedules the release one month from now
    pub is_upcoming: Option<String>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub cover_image: Option<Vec<u8>>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub pdf_file: Option<Vec<u8>>,
}
