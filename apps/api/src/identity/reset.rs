//! Password reset tokens: `password-reset:{token}`, TTL-bound and single use.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::identity::models::{Account, AccountLookup, PasswordResetToken};
use crate::identity::registry::IdentityRegistry;
use crate::identity::validation::{normalize_email, validate_password};
use crate::mailer::Mailer;
use crate::store::{get_json, keys, set_json_with_ttl, KeyStore};

#[derive(Debug, Clone, PartialEq)]
pub enum ResetOutcome {
    Reset,
    InvalidOrExpired,
}

#[derive(Clone)]
pub struct PasswordResets {
    store: Arc<dyn KeyStore>,
    registry: IdentityRegistry,
    mailer: Arc<dyn Mailer>,
    ttl_secs: u64,
    public_base_url: String,
}

impl PasswordResets {
    pub fn new(
        store: Arc<dyn KeyStore>,
        registry: IdentityRegistry,
        mailer: Arc<dyn Mailer>,
        ttl_secs: u64,
        public_base_url: String,
    ) -> Self {
        Self {
            store,
            registry,
            mailer,
            ttl_secs,
            public_base_url,
        }
    }

    /// Issues a token and mails the reset link. Unknown emails and accounts without
    /// a password succeed silently so the endpoint does not reveal which emails
    /// are registered. Returns the token when one was issued.
    pub async fn issue(&self, email: &str) -> Result<Option<String>, AppError> {
        let uid = normalize_email(email).map_err(AppError::Validation)?;

        match self.registry.load_account(&uid).await? {
            AccountLookup::Found(Account::Password { .. }) => {}
            _ => {
                debug!("No password account for {uid}, reset not issued");
                return Ok(None);
            }
        }

        let token = Uuid::new_v4().simple().to_string();
        let record = PasswordResetToken {
            token: token.clone(),
            uid: uid.clone(),
            email: uid.clone(),
            expires_at: Utc::now() + Duration::seconds(self.ttl_secs as i64),
        };
        set_json_with_ttl(
            self.store.as_ref(),
            &keys::password_reset(&token),
            &record,
            self.ttl_secs,
        )
        .await?;

        let link = format!(
            "{}/reset-password?token={token}",
            self.public_base_url.trim_end_matches('/')
        );
        self.mailer.send_password_reset(&record.email, &link).await?;

        info!("Password reset issued for {uid}");
        Ok(Some(token))
    }

    /// Consumes a token. The token is deleted before the password changes, and
    /// only the caller whose delete removed it may proceed, so concurrent
    /// confirms of one token see at most one `Reset`. A token found past its
    /// expiry is deleted too.
    pub async fn reset(&self, token: &str, new_password: &str) -> Result<ResetOutcome, AppError> {
        validate_password(new_password).map_err(AppError::Validation)?;

        let key = keys::password_reset(token);
        let Some(record) = get_json::<PasswordResetToken>(self.store.as_ref(), &key).await? else {
            return Ok(ResetOutcome::InvalidOrExpired);
        };

        if !self.store.delete(&key).await? {
            debug!("Reset token for {} already consumed", record.uid);
            return Ok(ResetOutcome::InvalidOrExpired);
        }

        if record.is_expired(Utc::now()) {
            return Ok(ResetOutcome::InvalidOrExpired);
        }

        if !self.registry.set_password(&record.uid, new_password).await? {
            // The account moved or lost its credentials since the token was issued.
            return Ok(ResetOutcome::InvalidOrExpired);
        }

        info!("Password reset completed for {}", record.uid);
        Ok(ResetOutcome::Reset)
    }
}
