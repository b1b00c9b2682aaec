//! Caller identity. Authentication happens upstream; the gateway forwards the
//! verified uid in a header. Handlers only ever mutate records owned by that uid.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::errors::AppError;
use crate::state::AppState;

/// The verified uid of the caller. Rejects the request with 401 when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerUid(pub String);

#[async_trait]
impl FromRequestParts<AppState> for CallerUid {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(state.config.auth_uid_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
            .map(|uid| CallerUid(uid.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}
