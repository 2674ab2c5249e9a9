//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{admin, auth, catalog, health, loans};

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SessionTokenAuth;

impl Modify for SessionTokenAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Session token returned by /auth/login"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "E-book Lending API",
        version = "0.3.0",
        description = "Catalog browsing, book loans and administration",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::logout,
        auth::me,
        // Catalog
        catalog::list_catalog,
        catalog::list_upcoming,
        catalog::get_book,
        // Loans
        loans::borrow_book,
        loans::return_book,
        loans::my_loans,
        // Admin
        admin::dashboard,
        admin::create_book,
        admin::update_book,
        admin::delete_book,
        admin::get_user,
        admin::create_user,
        admin::update_user,
        admin::delete_user,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            crate::models::user::Identity,
            crate::models::user::Role,
            // Books
            crate::models::book::Book,
            crate::models::book::BookShort,
            crate::models::book::BookDetail,
            crate::models::book::BookForm,
            crate::models::session::FlashMessages,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanWithBook,
            crate::models::loan::MyLoans,
            crate::models::loan::LoanRequest,
            // Admin
            crate::models::dashboard::Dashboard,
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SessionTokenAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Login, logout and session identity"),
        (name = "catalog", description = "Book catalog"),
        (name = "loans", description = "Borrowing and returning books"),
        (name = "admin", description = "Administration")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
