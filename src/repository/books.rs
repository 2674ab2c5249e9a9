//! Books repository for catalog reads and admin edits.
//!
//! Stock is written here only when a book is created; afterwards it belongs
//! to the loan ledger.

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookShort, SaveBook},
};

const BOOK_COLUMNS: &str = r#"
    id, title, author, genre, stock, description, cover_image_path, pdf_file_path,
    release_date, release_date <= NOW() AS is_available
"#;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Released books, by title
    pub async fn list_released(&self) -> AppResult<Vec<BookShort>> {
        let books = sqlx::query_as::<_, BookShort>(
            r#"
            SELECT id, title, author, cover_image_path, release_date
            FROM books
            WHERE release_date <= NOW()
            ORDER BY title
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    /// Books not yet released, soonest first
    pub async fn list_upcoming(&self) -> AppResult<Vec<BookShort>> {
        let books = sqlx::query_as::<_, BookShort>(
            r#"
            SELECT id, title, author, cover_image_path, release_date
            FROM books
            WHERE release_date > NOW()
            ORDER BY release_date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    /// All books, newest first
    pub async fn list_all(&self) -> AppResult<Vec<BookShort>> {
        let books = sqlx::query_as::<_, BookShort>(
            "SELECT id, title, author, cover_image_path, release_date FROM books ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn create(&self, book: &SaveBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, genre, stock, description, cover_image_path, pdf_file_path, release_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.genre)
        .bind(book.stock)
        .bind(&book.description)
        .bind(&book.cover_image_path)
        .bind(&book.pdf_file_path)
        .bind(book.release_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Update descriptive fields; file paths change only when a new file was stored
    pub async fn update(&self, id: i32, book: &SaveBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books
            SET title = $2, author = $3, genre = $4, description = $5,
                cover_image_path = COALESCE($6, cover_image_path),
                pdf_file_path = COALESCE($7, pdf_file_path),
                release_date = $8
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.genre)
        .bind(&book.description)
        .bind(&book.cover_image_path)
        .bind(&book.pdf_file_path)
        .bind(book.release_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book, returning its stored file names
    pub async fn delete(&self, id: i32) -> AppResult<(Option<String>, Option<String>)> {
        let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            "DELETE FROM books WHERE id = $1 RETURNING cover_image_path, pdf_file_path",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)
        .map_err(|e| {
            if e.is_foreign_key_violation() {
                AppError::Conflict("Book has loan history and cannot be deleted".to_string())
            } else {
                e
            }
        })?;

        row.ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }
}
