//! In-process store implementing [`Ledger`] and [`CredentialStore`].
//!
//! Transactions are serializable: `begin` takes the state lock for the whole
//! transaction and works on a staged copy that replaces the shared state
//! only on commit. Used by the test suites and for running the workflow
//! without PostgreSQL.

use std::collections::{HashMap, HashSet};
use std::sync::{
    atomic::{AtomicBool, AtomicI32, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{
    ledger::{Ledger, LedgerTx},
    users::CredentialStore,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanStatus},
        user::{Credentials, Role},
    },
};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    /// book id -> stock
    books: HashMap<i32, i32>,
    loans: Vec<Loan>,
    removed_users: HashSet<i32>,
    next_book_id: i32,
    next_loan_id: i32,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<LedgerState>>,
    users: Arc<RwLock<HashMap<String, Credentials>>>,
    next_user_id: Arc<AtomicI32>,
    fail_next_open: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a book with the given stock, returning its id
    pub async fn add_book(&self, stock: i32) -> i32 {
        let mut state = self.state.lock().await;
        state.next_book_id += 1;
        let id = state.next_book_id;
        state.books.insert(id, stock);
        id
    }

    pub async fn stock(&self, book_id: i32) -> Option<i32> {
        self.state.lock().await.books.get(&book_id).copied()
    }

    /// Every loan row ever written, in insertion order
    pub async fn loans(&self) -> Vec<Loan> {
        self.state.lock().await.loans.clone()
    }

    /// Register an account; `password_hash` must be a PHC string
    pub async fn add_user(&self, username: &str, name: &str, password_hash: &str, role: Role) -> i32 {
        let mut users = self.users.write().await;
        let id = self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1;
        users.insert(
            username.to_string(),
            Credentials {
                id,
                name: name.to_string(),
                password_hash: password_hash.to_string(),
                role,
            },
        );
        id
    }

    /// Delete an account; sessions already issued to it stay valid
    pub async fn remove_user(&self, username: &str) -> Option<i32> {
        let removed = self.users.write().await.remove(username)?;
        self.state.lock().await.removed_users.insert(removed.id);
        Some(removed.id)
    }

    /// Make the next loan insert fail like a lost database connection
    pub fn fail_next_open_loan(&self) {
        self.fail_next_open.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            fail_next_open: self.fail_next_open.clone(),
        }))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_credentials(&self, username: &str) -> AppResult<Option<Credentials>> {
        Ok(self.users.read().await.get(username).cloned())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
    fail_next_open: Arc<AtomicBool>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_book(&mut self, book_id: i32) -> AppResult<bool> {
        Ok(self.staged.books.contains_key(&book_id))
    }

    async fn has_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<bool> {
        Ok(self.staged.loans.iter().any(|l| {
            l.user_id == user_id && l.book_id == book_id && l.status == LoanStatus::Active
        }))
    }

    async fn take_copy(&mut self, book_id: i32) -> AppResult<u64> {
        match self.staged.books.get_mut(&book_id) {
            Some(stock) if *stock > 0 => {
                *stock -= 1;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn open_loan(&mut self, user_id: i32, book_id: i32, at: DateTime<Utc>) -> AppResult<Loan> {
        if self.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::Protocol(
                "connection reset while inserting loan".to_string(),
            )));
        }

        if self.staged.removed_users.contains(&user_id) {
            return Err(AppError::account_removed());
        }

        self.staged.next_loan_id += 1;
        let loan = Loan {
            id: self.staged.next_loan_id,
            user_id,
            book_id,
            loan_date: at,
            return_date: None,
            status: LoanStatus::Active,
        };
        self.staged.loans.push(loan.clone());
        Ok(loan)
    }

    async fn latest_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>> {
        Ok(self
            .staged
            .loans
            .iter()
            .filter(|l| l.user_id == user_id && l.book_id == book_id && l.status == LoanStatus::Active)
            .max_by_key(|l| l.loan_date)
            .cloned())
    }

    async fn close_loan(&mut self, loan_id: i32, at: DateTime<Utc>) -> AppResult<u64> {
        match self
            .staged
            .loans
            .iter_mut()
            .find(|l| l.id == loan_id && l.status == LoanStatus::Active)
        {
            Some(loan) => {
                loan.status = LoanStatus::Returned;
                loan.return_date = Some(at.max(loan.loan_date));
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn put_back_copy(&mut self, book_id: i32) -> AppResult<u64> {
        match self.staged.books.get_mut(&book_id) {
            Some(stock) => {
                *stock += 1;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, staged, .. } = *self;
        *guard = staged;
        Ok(())
    }
}
