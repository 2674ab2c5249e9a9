//! E-book lending server
//!
//! Users browse a catalog and borrow or return books; administrators manage
//! books and accounts. Borrowing and returning run as single database
//! transactions that keep book stock and loan records consistent under
//! concurrent requests.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        .route("/auth/login", post(api::auth::login));

    let admin = Router::new()
        .route("/admin/dashboard", get(api::admin::dashboard))
        .route("/admin/books", post(api::admin::create_book))
        .route(
            "/admin/books/:id",
            put(api::admin::update_book).delete(api::admin::delete_book),
        )
        .route("/admin/users", post(api::admin::create_user))
        .route(
            "/admin/users/:id",
            get(api::admin::get_user)
                .put(api::admin::update_user)
                .delete(api::admin::delete_user),
        )
        .layer(DefaultBodyLimit::max(api::admin::MAX_UPLOAD_BYTES))
        .route_layer(middleware::from_fn(api::guard::require_admin));

    // Guards run outermost first: session, then role
    let protected = Router::new()
        .route("/auth/logout", post(api::auth::logout))
        .route("/auth/me", get(api::auth::me))
        .route("/catalog", get(api::catalog::list_catalog))
        .route("/upcoming", get(api::catalog::list_upcoming))
        .route("/books/:id", get(api::catalog::get_book))
        .route("/loans/borrow", post(api::loans::borrow_book))
        .route("/loans/return", post(api::loans::return_book))
        .route("/loans/mine", get(api::loans::my_loans))
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::guard::require_authenticated,
        ));

    let api_v1 = public.merge(protected).with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
