//! Loan workflow: borrowing and returning books.
//!
//! Each operation runs in one ledger transaction. Every refusal returns
//! before `commit`, so the transaction is dropped and rolled back.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::{
    error::{AppError, AppResult, LoanError},
    models::loan::{Loan, LoanStatus},
    repository::Ledger,
};

#[derive(Clone)]
pub struct LoansService {
    ledger: Arc<dyn Ledger>,
    timeout: Duration,
}

impl LoansService {
    pub fn new(ledger: Arc<dyn Ledger>, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    /// Borrow one copy of a book
    pub async fn borrow_book(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        let result = self.bounded(self.try_borrow(user_id, book_id)).await;
        match &result {
            Ok(loan) => tracing::info!(user_id, book_id, loan_id = loan.id, "Book borrowed"),
            Err(AppError::Loan(e)) => tracing::info!(user_id, book_id, "Borrow refused: {}", e),
            Err(e @ AppError::Authentication(_)) => {
                tracing::warn!(user_id, book_id, "Borrow by removed account: {}", e)
            }
            Err(e) => tracing::error!(user_id, book_id, "Borrow failed: {}", e),
        }
        result
    }

    /// Return the most recent active loan of a book
    pub async fn return_book(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        let result = self.bounded(self.try_return(user_id, book_id)).await;
        match &result {
            Ok(loan) => tracing::info!(user_id, book_id, loan_id = loan.id, "Book returned"),
            Err(AppError::Loan(e)) => tracing::info!(user_id, book_id, "Return refused: {}", e),
            Err(e) => tracing::error!(user_id, book_id, "Return failed: {}", e),
        }
        result
    }

    async fn try_borrow(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        let mut tx = self.ledger.begin().await?;

        // Serializes concurrent borrows of this book until commit
        if !tx.lock_book(book_id).await? {
            return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
        }

        if tx.has_active_loan(user_id, book_id).await? {
            return Err(LoanError::AlreadyBorrowed.into());
        }

        if tx.take_copy(book_id).await? == 0 {
            return Err(LoanError::OutOfStock.into());
        }

        let loan = tx.open_loan(user_id, book_id, Utc::now()).await?;
        tx.commit().await?;
        Ok(loan)
    }

    async fn try_return(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        let mut tx = self.ledger.begin().await?;

        let loan = tx
            .latest_active_loan(user_id, book_id)
            .await?
            .ok_or(LoanError::NoActiveLoan)?;

        let now = Utc::now();
        // A concurrent return may have closed the loan after we read it
        if tx.close_loan(loan.id, now).await? == 0 {
            return Err(LoanError::AlreadyReturned.into());
        }

        if tx.put_back_copy(book_id).await? == 0 {
            return Err(AppError::Internal(format!(
                "Book {} of loan {} disappeared during return",
                book_id, loan.id
            )));
        }

        tx.commit().await?;

        Ok(Loan {
            return_date: Some(now.max(loan.loan_date)),
            status: LoanStatus::Returned,
            ..loan
        })
    }

    async fn bounded<T>(&self, operation: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| {
                AppError::Unavailable(format!(
                    "Loan transaction exceeded {} ms",
                    self.timeout.as_millis()
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{LedgerTx, MemoryStore};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::Mutex;

    fn service(store: &MemoryStore) -> LoansService {
        LoansService::new(Arc::new(store.clone()), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn borrow_decrements_stock_and_opens_loan() {
        let store = MemoryStore::new();
        let book = store.add_book(2).await;

        let loan = service(&store).borrow_book(1, book).await.unwrap();

        assert_eq!(loan.status, LoanStatus::Active);
        assert!(loan.return_date.is_none());
        assert_eq!(store.stock(book).await, Some(1));
    }

    #[tokio::test]
    async fn borrow_of_missing_book_is_not_found() {
        let store = MemoryStore::new();
        let err = service(&store).borrow_book(1, 42).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.loans().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_borrow_leaves_stock_alone() {
        let store = MemoryStore::new();
        let book = store.add_book(3).await;
        let loans = service(&store);

        loans.borrow_book(1, book).await.unwrap();
        let err = loans.borrow_book(1, book).await.unwrap_err();

        assert!(matches!(err, AppError::Loan(LoanError::AlreadyBorrowed)));
        assert_eq!(store.stock(book).await, Some(2));
        assert_eq!(store.loans().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_decrement() {
        let store = MemoryStore::new();
        let book = store.add_book(1).await;
        store.fail_next_open_loan();

        let err = service(&store).borrow_book(1, book).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(store.stock(book).await, Some(1));
        assert!(store.loans().await.is_empty());
    }

    /// Replays a return whose loan was closed by someone else between the
    /// read and the conditional update.
    #[derive(Default)]
    struct RacedReturn {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Ledger for RacedReturn {
        async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
            Ok(Box::new(RacedTx {
                calls: self.calls.clone(),
            }))
        }
    }

    struct RacedTx {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RacedTx {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl LedgerTx for RacedTx {
        async fn lock_book(&mut self, _book_id: i32) -> AppResult<bool> {
            self.record("lock_book");
            Ok(true)
        }

        async fn has_active_loan(&mut self, _user_id: i32, _book_id: i32) -> AppResult<bool> {
            self.record("has_active_loan");
            Ok(false)
        }

        async fn take_copy(&mut self, _book_id: i32) -> AppResult<u64> {
            self.record("take_copy");
            Ok(1)
        }

        async fn open_loan(&mut self, _user_id: i32, _book_id: i32, _at: DateTime<Utc>) -> AppResult<Loan> {
            unreachable!("not used by returns")
        }

        async fn latest_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>> {
            self.record("latest_active_loan");
            Ok(Some(Loan {
                id: 9,
                user_id,
                book_id,
                loan_date: Utc::now(),
                return_date: None,
                status: LoanStatus::Active,
            }))
        }

        async fn close_loan(&mut self, _loan_id: i32, _at: DateTime<Utc>) -> AppResult<u64> {
            self.record("close_loan");
            Ok(0)
        }

        async fn put_back_copy(&mut self, _book_id: i32) -> AppResult<u64> {
            self.record("put_back_copy");
            Ok(1)
        }

        async fn commit(self: Box<Self>) -> AppResult<()> {
            self.record("commit");
            Ok(())
        }
    }

    #[tokio::test]
    async fn lost_close_race_is_already_returned_without_restock() {
        let ledger = RacedReturn::default();
        let calls = ledger.calls.clone();
        let loans = LoansService::new(Arc::new(ledger), Duration::from_secs(5));

        let err = loans.return_book(1, 1).await.unwrap_err();

        assert!(matches!(err, AppError::Loan(LoanError::AlreadyReturned)));
        assert_eq!(*calls.lock().unwrap(), vec!["latest_active_loan", "close_loan"]);
    }

    #[tokio::test]
    async fn transaction_exceeding_timeout_is_unavailable() {
        let store = MemoryStore::new();
        let book = store.add_book(1).await;

        // Hold the ledger so the borrow cannot begin
        let held = store.begin().await.unwrap();
        let loans = LoansService::new(Arc::new(store.clone()), Duration::from_millis(50));
        let err = loans.borrow_book(1, book).await.unwrap_err();
        drop(held);

        assert!(matches!(err, AppError::Unavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(store.stock(book).await, Some(1));
    }
}
