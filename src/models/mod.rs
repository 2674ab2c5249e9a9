//! Data models for the lending server

pub mod book;
pub mod dashboard;
pub mod loan;
pub mod session;
pub mod user;

pub use book::{Book, BookShort};
pub use dashboard::Dashboard;
pub use loan::{Loan, LoanStatus};
pub use session::{FlashKind, FlashMessages, SessionData};
pub use user::{Identity, Role, User};
