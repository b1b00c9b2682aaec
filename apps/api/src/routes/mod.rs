pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::directory::handlers as directory;
use crate::identity::handlers as identity;
use crate::resume::handlers as resume;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Accounts
        .route("/api/v1/accounts", post(identity::handle_signup))
        .route(
            "/api/v1/accounts/external",
            post(identity::handle_external_login),
        )
        .route(
            "/api/v1/accounts/me",
            get(identity::handle_get_me).patch(identity::handle_update_profile),
        )
        .route(
            "/api/v1/accounts/me/email",
            post(identity::handle_change_email),
        )
        .route(
            "/api/v1/accounts/me/password",
            post(identity::handle_change_password),
        )
        .route("/api/v1/password-reset", post(identity::handle_request_reset))
        .route(
            "/api/v1/password-reset/confirm",
            post(identity::handle_confirm_reset),
        )
        // Usernames
        .route(
            "/api/v1/usernames",
            post(identity::handle_claim_username).put(identity::handle_rename_username),
        )
        .route(
            "/api/v1/usernames/:name/availability",
            get(identity::handle_username_availability),
        )
        // Resume
        .route("/api/v1/resume", get(resume::handle_get_resume))
        .route("/api/v1/resume/upload", post(resume::handle_upload))
        .route(
            "/api/v1/resume/structured",
            put(resume::handle_edit_structured),
        )
        // Portfolios
        .route("/api/v1/portfolios", get(directory::handle_list_portfolios))
        .route(
            "/api/v1/portfolios/:username",
            get(directory::handle_get_portfolio),
        )
        .route("/sitemap.txt", get(directory::handle_sitemap))
        .with_state(state)
}
