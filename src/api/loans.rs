//! Borrow and return endpoints

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::WithRejection;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanRequest, MyLoans},
        session::FlashKind,
    },
    services::sessions::pop_flashes,
    AppState,
};

use super::{AuthenticatedUser, CurrentSession};

const BORROWED: &str = "Book borrowed successfully!";
const RETURNED: &str = "Book returned successfully!";
const FAILED: &str = "Something went wrong, please try again.";

/// Record the outcome of a loan operation as a flash message
async fn flash_outcome(state: &AppState, session: &CurrentSession, result: &AppResult<Loan>, success: &str) {
    let (kind, message) = match result {
        Ok(_) => (FlashKind::Success, success),
        Err(AppError::Loan(e)) => (FlashKind::Error, e.user_message()),
        Err(_) => (FlashKind::Error, FAILED),
    };

    if let Err(e) = state
        .services
        .sessions
        .put_flash(&session.token, kind, message)
        .await
    {
        tracing::warn!(user_id = session.identity.user_id, "Failed to store flash message: {}", e);
    }
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/loans/borrow",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = LoanRequest,
    responses(
        (status = 201, description = "Loan opened", body = Loan),
        (status = 400, description = "Malformed request", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already borrowed or out of stock", body = crate::error::ErrorResponse),
        (status = 503, description = "Transaction timed out", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    WithRejection(Json(request), _): WithRejection<Json<LoanRequest>, AppError>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let result = state
        .services
        .loans
        .borrow_book(session.identity.user_id, request.book_id)
        .await;
    flash_outcome(&state, &session, &result, BORROWED).await;

    result.map(|loan| (StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = LoanRequest,
    responses(
        (status = 200, description = "Loan closed", body = Loan),
        (status = 400, description = "Malformed request", body = crate::error::ErrorResponse),
        (status = 409, description = "No active loan or already returned", body = crate::error::ErrorResponse),
        (status = 503, description = "Transaction timed out", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    WithRejection(Json(request), _): WithRejection<Json<LoanRequest>, AppError>,
) -> AppResult<Json<Loan>> {
    let result = state
        .services
        .loans
        .return_book(session.identity.user_id, request.book_id)
        .await;
    flash_outcome(&state, &session, &result, RETURNED).await;

    result.map(Json)
}

/// Loans of the current user, newest first
#[utoipa::path(
    get,
    path = "/loans/mine",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loans with book data and pending flash messages", body = MyLoans)
    )
)]
pub async fn my_loans(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
) -> AppResult<Json<MyLoans>> {
    let mut loans = state.services.catalog.user_loans(session.identity.user_id).await?;
    loans.flash = pop_flashes(state.services.sessions.as_ref(), &session.token).await?;
    Ok(Json(loans))
}
