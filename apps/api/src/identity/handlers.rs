use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::CallerUid;
use crate::errors::AppError;
use crate::identity::models::{
    Account, AccountLookup, ClaimOutcome, CreateAccountOutcome, MigrateOutcome,
    PasswordChangeOutcome, ProfileUpdate, RenameOutcome, UserRecord,
};
use crate::identity::reset::ResetOutcome;
use crate::identity::validation::normalize_email;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Accounts
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub uid: String,
}

/// POST /api/v1/accounts
pub async fn handle_signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    match state
        .registry
        .create_with_credentials(&req.email, &req.password, req.display_name)
        .await?
    {
        CreateAccountOutcome::Created { uid } => {
            Ok((StatusCode::CREATED, Json(SignupResponse { uid })))
        }
        CreateAccountOutcome::Conflict => Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        )),
    }
}

#[derive(Deserialize)]
pub struct ExternalLoginRequest {
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// POST /api/v1/accounts/external
///
/// Called after the gateway verified an external identity; the verified uid must
/// be the one derived from `email`.
pub async fn handle_external_login(
    State(state): State<AppState>,
    caller: CallerUid,
    Json(req): Json<ExternalLoginRequest>,
) -> Result<Json<UserRecord>, AppError> {
    let uid = normalize_email(&req.email).map_err(AppError::Validation)?;
    if uid != caller.0 {
        return Err(AppError::Forbidden);
    }
    let user = state
        .registry
        .ensure_external_user(&uid, req.display_name, req.avatar_url)
        .await?;
    Ok(Json(user))
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: UserRecord,
    pub username: Option<String>,
    pub has_password: bool,
}

/// GET /api/v1/accounts/me
pub async fn handle_get_me(
    State(state): State<AppState>,
    CallerUid(uid): CallerUid,
) -> Result<Json<MeResponse>, AppError> {
    let AccountLookup::Found(account) = state.registry.load_account(&uid).await? else {
        return Err(AppError::NotFound(format!("Account {uid} not found")));
    };
    let username = state.registry.get_username_by_uid(&uid).await?;
    Ok(Json(MeResponse {
        user: account.user().clone(),
        username,
        has_password: matches!(account, Account::Password { .. }),
    }))
}

/// PATCH /api/v1/accounts/me
pub async fn handle_update_profile(
    State(state): State<AppState>,
    CallerUid(uid): CallerUid,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserRecord>, AppError> {
    Ok(Json(state.registry.update_profile(&uid, update).await?))
}

#[derive(Deserialize)]
pub struct ChangeEmailRequest {
    pub new_email: String,
}

#[derive(Serialize)]
pub struct ChangeEmailResponse {
    pub uid: String,
}

/// POST /api/v1/accounts/me/email
///
/// Safe to retry with the same body after a failure; the second call finishes
/// the migration.
pub async fn handle_change_email(
    State(state): State<AppState>,
    CallerUid(uid): CallerUid,
    Json(req): Json<ChangeEmailRequest>,
) -> Result<Json<ChangeEmailResponse>, AppError> {
    match state.registry.migrate_identity(&uid, &req.new_email).await? {
        MigrateOutcome::Migrated => Ok(Json(ChangeEmailResponse {
            uid: normalize_email(&req.new_email).map_err(AppError::Validation)?,
        })),
        MigrateOutcome::Conflict => Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        )),
    }
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// POST /api/v1/accounts/me/password
pub async fn handle_change_password(
    State(state): State<AppState>,
    CallerUid(uid): CallerUid,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    match state
        .registry
        .change_password(&uid, &req.current_password, &req.new_password)
        .await?
    {
        PasswordChangeOutcome::Changed => Ok(StatusCode::NO_CONTENT),
        PasswordChangeOutcome::WrongPassword => Err(AppError::Forbidden),
        PasswordChangeOutcome::NotPasswordAccount => Err(AppError::Validation(
            "This account signs in with an external provider".to_string(),
        )),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Password reset
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

/// POST /api/v1/password-reset
///
/// Always 202, whether or not the email belongs to an account.
pub async fn handle_request_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Result<StatusCode, AppError> {
    state.resets.issue(&req.email).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct ResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

/// POST /api/v1/password-reset/confirm
pub async fn handle_confirm_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetConfirmRequest>,
) -> Result<StatusCode, AppError> {
    match state.resets.reset(&req.token, &req.new_password).await? {
        ResetOutcome::Reset => Ok(StatusCode::NO_CONTENT),
        ResetOutcome::InvalidOrExpired => Err(AppError::Validation(
            "Reset link is invalid or has expired".to_string(),
        )),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Usernames
// ────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub username: String,
    pub available: bool,
}

/// GET /api/v1/usernames/:name/availability
pub async fn handle_username_availability(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let available = state.registry.check_username_available(&name).await?;
    Ok(Json(AvailabilityResponse {
        username: name.trim().to_lowercase(),
        available,
    }))
}

#[derive(Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Serialize)]
pub struct UsernameResponse {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

/// POST /api/v1/usernames
pub async fn handle_claim_username(
    State(state): State<AppState>,
    CallerUid(uid): CallerUid,
    Json(req): Json<UsernameRequest>,
) -> Result<(StatusCode, Json<UsernameResponse>), AppError> {
    match state.registry.claim_username(&uid, &req.username).await? {
        ClaimOutcome::Claimed { username } => Ok((
            StatusCode::CREATED,
            Json(UsernameResponse {
                username,
                previous: None,
            }),
        )),
        ClaimOutcome::Unavailable => Err(username_taken()),
        ClaimOutcome::InvalidName(reason) => Err(AppError::Validation(reason)),
    }
}

/// PUT /api/v1/usernames
pub async fn handle_rename_username(
    State(state): State<AppState>,
    CallerUid(uid): CallerUid,
    Json(req): Json<UsernameRequest>,
) -> Result<Json<UsernameResponse>, AppError> {
    match state.registry.rename_username(&uid, &req.username).await? {
        RenameOutcome::Renamed { from, to } => Ok(Json(UsernameResponse {
            username: to,
            previous: from,
        })),
        RenameOutcome::Unavailable => Err(username_taken()),
        RenameOutcome::InvalidName(reason) => Err(AppError::Validation(reason)),
    }
}

fn username_taken() -> AppError {
    AppError::Conflict("Username is not available".to_string())
}
