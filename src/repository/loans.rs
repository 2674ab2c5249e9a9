//! Loans repository for read-only queries.
//!
//! Loans are created and closed through the ledger (see `ledger.rs`).

use sqlx::{Pool, Postgres};

use crate::{error::AppResult, models::loan::LoanWithBook};

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// All loans of a user with book data, newest first
    pub async fn get_user_loans(&self, user_id: i32) -> AppResult<Vec<LoanWithBook>> {
        let loans = sqlx::query_as::<_, LoanWithBook>(
            r#"
            SELECT l.id, b.id AS book_id, b.title, b.author, b.cover_image_path, b.pdf_file_path,
                   l.loan_date, l.return_date, l.status
            FROM loans l
            JOIN books b ON l.book_id = b.id
            WHERE l.user_id = $1
            ORDER BY l.loan_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    /// Whether the user currently holds the book
    pub async fn has_active_loan(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND book_id = $2 AND status = 'active')",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Count all loans, active and returned
    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
