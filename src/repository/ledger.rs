//! Inventory ledger: book stock and loan rows, mutated only inside a
//! transaction.
//!
//! A [`LedgerTx`] that is dropped without [`LedgerTx::commit`] rolls back
//! everything it did, so every early return in the loan workflow leaves the
//! ledger untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult, LoanError},
    models::loan::Loan,
};

/// Opens ledger transactions
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>>;
}

/// Operations available inside one ledger transaction
#[async_trait]
pub trait LedgerTx: Send {
    /// Lock the book row for the rest of the transaction.
    /// Returns false when the book does not exist.
    async fn lock_book(&mut self, book_id: i32) -> AppResult<bool>;

    async fn has_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<bool>;

    /// `stock = stock - 1` only where `stock > 0`; returns affected rows
    async fn take_copy(&mut self, book_id: i32) -> AppResult<u64>;

    /// Insert an active loan. Fails with [`AppError::account_removed`] when
    /// the user no longer exists.
    async fn open_loan(&mut self, user_id: i32, book_id: i32, at: DateTime<Utc>) -> AppResult<Loan>;

    /// Most recent active loan for the pair
    async fn latest_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>>;

    /// Mark the loan returned only if it is still active; returns affected rows
    async fn close_loan(&mut self, loan_id: i32, at: DateTime<Utc>) -> AppResult<u64>;

    /// `stock = stock + 1`; returns affected rows
    async fn put_back_copy(&mut self, book_id: i32) -> AppResult<u64>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// PostgreSQL ledger
#[derive(Clone)]
pub struct PgLedger {
    pool: Pool<Postgres>,
    timeout_ms: u64,
}

impl PgLedger {
    pub fn new(pool: Pool<Postgres>, timeout_ms: u64) -> Self {
        Self { pool, timeout_ms }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters; the values are integers from config
        sqlx::query(&format!("SET LOCAL lock_timeout = {}", self.timeout_ms))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("SET LOCAL statement_timeout = {}", self.timeout_ms))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgLedgerTx { tx }))
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_book(&mut self, book_id: i32) -> AppResult<bool> {
        let id: Option<i32> = sqlx::query_scalar("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id.is_some())
    }

    async fn has_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND book_id = $2 AND status = 'active')",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn take_copy(&mut self, book_id: i32) -> AppResult<u64> {
        let result = sqlx::query("UPDATE books SET stock = stock - 1 WHERE id = $1 AND stock > 0")
            .bind(book_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn open_loan(&mut self, user_id: i32, book_id: i32, at: DateTime<Utc>) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, book_id, loan_date, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING id, user_id, book_id, loan_date, return_date, status
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(AppError::from)
        .map_err(|e| {
            if e.is_unique_violation() {
                // loans_one_active_per_pair backs up the explicit check
                AppError::Loan(LoanError::AlreadyBorrowed)
            } else if e.is_foreign_key_violation() {
                // The book row is locked, so the missing row is the user's
                AppError::account_removed()
            } else {
                e
            }
        })?;
        Ok(loan)
    }

    async fn latest_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            SELECT id, user_id, book_id, loan_date, return_date, status
            FROM loans
            WHERE user_id = $1 AND book_id = $2 AND status = 'active'
            ORDER BY loan_date DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(loan)
    }

    async fn close_loan(&mut self, loan_id: i32, at: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE loans SET status = 'returned', return_date = GREATEST($2, loan_date) WHERE id = $1 AND status = 'active'",
        )
        .bind(loan_id)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn put_back_copy(&mut self, book_id: i32) -> AppResult<u64> {
        let result = sqlx::query("UPDATE books SET stock = stock + 1 WHERE id = $1")
            .bind(book_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
