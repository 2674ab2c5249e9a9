//! Admin dashboard payload

use serde::Serialize;
use utoipa::ToSchema;

use super::{book::BookShort, user::UserShort};

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    pub user_count: i64,
    pub book_count: i64,
    /// Active and returned loans
    pub loan_count: i64,
    /// Newest first
    pub books: Vec<BookShort>,
    /// Newest first
    pub users: Vec<UserShort>,
}
