//! Loan workflow properties under concurrency, run against the in-process ledger

use std::sync::Arc;
use std::time::Duration;

use ebook_lending_server::{
    error::{AppError, LoanError},
    models::{LoanStatus, Role},
    repository::MemoryStore,
    services::loans::LoansService,
};
use tokio::task::JoinSet;

fn loans(store: &MemoryStore) -> LoansService {
    LoansService::new(Arc::new(store.clone()), Duration::from_secs(5))
}

fn loan_error(result: Result<impl Sized, AppError>) -> LoanError {
    match result {
        Err(AppError::Loan(e)) => e,
        Err(other) => panic!("expected a loan refusal, got {:?}", other),
        Ok(_) => panic!("expected a loan refusal, got success"),
    }
}

#[tokio::test]
async fn concurrent_borrows_of_last_copy_have_one_winner() {
    let store = MemoryStore::new();
    let book = store.add_book(1).await;
    let service = loans(&store);

    let mut set = JoinSet::new();
    for user_id in 1..=20 {
        let service = service.clone();
        set.spawn(async move { service.borrow_book(user_id, book).await });
    }

    let mut succeeded = 0;
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(_) => succeeded += 1,
            refused => assert_eq!(loan_error(refused), LoanError::OutOfStock),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(store.stock(book).await, Some(0));
    assert_eq!(store.loans().await.len(), 1);
}

#[tokio::test]
async fn concurrent_borrows_by_one_user_open_one_loan() {
    let store = MemoryStore::new();
    let book = store.add_book(10).await;
    let service = loans(&store);

    let mut set = JoinSet::new();
    for _ in 0..10 {
        let service = service.clone();
        set.spawn(async move { service.borrow_book(7, book).await });
    }

    let mut succeeded = 0;
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(_) => succeeded += 1,
            refused => assert_eq!(loan_error(refused), LoanError::AlreadyBorrowed),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(store.stock(book).await, Some(9));
    let active = store
        .loans()
        .await
        .into_iter()
        .filter(|l| l.user_id == 7 && l.status == LoanStatus::Active)
        .count();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn return_without_loan_is_refused_and_stock_unchanged() {
    let store = MemoryStore::new();
    let book = store.add_book(2).await;

    let result = loans(&store).return_book(1, book).await;

    assert_eq!(loan_error(result), LoanError::NoActiveLoan);
    assert_eq!(store.stock(book).await, Some(2));
}

#[tokio::test]
async fn concurrent_returns_restock_once() {
    let store = MemoryStore::new();
    let book = store.add_book(1).await;
    let service = loans(&store);
    service.borrow_book(1, book).await.unwrap();

    let mut set = JoinSet::new();
    for _ in 0..8 {
        let service = service.clone();
        set.spawn(async move { service.return_book(1, book).await });
    }

    let mut succeeded = 0;
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(_) => succeeded += 1,
            refused => {
                let e = loan_error(refused);
                assert!(matches!(e, LoanError::NoActiveLoan | LoanError::AlreadyReturned));
            }
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(store.stock(book).await, Some(1));
}

#[tokio::test]
async fn borrow_then_return_round_trip() {
    let store = MemoryStore::new();
    let book = store.add_book(3).await;
    let service = loans(&store);

    let borrowed = service.borrow_book(1, book).await.unwrap();
    assert_eq!(store.stock(book).await, Some(2));
    let returned = service.return_book(1, book).await.unwrap();

    assert_eq!(store.stock(book).await, Some(3));
    assert_eq!(returned.id, borrowed.id);

    let rows = store.loans().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, LoanStatus::Returned);
    let return_date = rows[0].return_date.expect("return date set");
    assert!(return_date >= rows[0].loan_date);
}

#[tokio::test]
async fn returned_loan_is_history_and_new_borrow_is_a_new_row() {
    let store = MemoryStore::new();
    let book = store.add_book(1).await;
    let service = loans(&store);

    let first = service.borrow_book(1, book).await.unwrap();
    service.return_book(1, book).await.unwrap();
    let second = service.borrow_book(1, book).await.unwrap();

    assert_ne!(first.id, second.id);
    let rows = store.loans().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status, LoanStatus::Returned);
    assert_eq!(rows[1].status, LoanStatus::Active);
}

#[tokio::test]
async fn last_copy_passes_from_one_reader_to_another() {
    let store = MemoryStore::new();
    let book_a = store.add_book(1).await;
    let service = loans(&store);
    let (x, y) = (1, 2);

    service.borrow_book(x, book_a).await.unwrap();
    assert_eq!(store.stock(book_a).await, Some(0));

    assert_eq!(loan_error(service.borrow_book(y, book_a).await), LoanError::OutOfStock);

    service.return_book(x, book_a).await.unwrap();
    assert_eq!(store.stock(book_a).await, Some(1));

    service.borrow_book(y, book_a).await.unwrap();
    assert_eq!(store.stock(book_a).await, Some(0));
}

#[tokio::test]
async fn storage_failure_mid_borrow_leaves_no_trace() {
    let store = MemoryStore::new();
    let book = store.add_book(1).await;
    let service = loans(&store);
    store.fail_next_open_loan();

    let err = service.borrow_book(1, book).await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
    assert!(err.is_retryable());
    assert_eq!(store.stock(book).await, Some(1));
    assert!(store.loans().await.is_empty());

    // Retrying succeeds once storage recovers
    service.borrow_book(1, book).await.unwrap();
    assert_eq!(store.stock(book).await, Some(0));
}

#[tokio::test]
async fn borrow_by_removed_account_is_rejected_and_rolled_back() {
    let store = MemoryStore::new();
    let book = store.add_book(1).await;
    let user = store.add_user("gone", "Gone", "unused", Role::User).await;
    store.remove_user("gone").await;

    let err = loans(&store).borrow_book(user, book).await.unwrap_err();

    assert!(matches!(err, AppError::Authentication(_)));
    assert!(!err.is_retryable());
    assert_eq!(store.stock(book).await, Some(1));
    assert!(store.loans().await.is_empty());
}
