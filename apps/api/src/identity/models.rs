use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the account authenticates. Persisted so that a password account whose
/// credentials never landed can be told apart from an external-identity account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Password,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: AuthProvider,
    /// Set on the destination record of an email change; marks a copy this
    /// account's migration owns so the migration can be re-run.
    #[serde(default)]
    pub migrated_from: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(uid: &str, provider: AuthProvider, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.to_string(),
            display_name,
            avatar_url: None,
            provider,
            migrated_from: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub uid: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A complete account, as seen by readers.
#[derive(Debug, Clone, PartialEq)]
pub enum Account {
    Password {
        user: UserRecord,
        credentials: CredentialRecord,
    },
    External {
        user: UserRecord,
    },
}

impl Account {
    pub fn user(&self) -> &UserRecord {
        match self {
            Account::Password { user, .. } | Account::External { user } => user,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccountLookup {
    Found(Account),
    /// A password account whose credential write never happened. Readers treat
    /// it as absent; a signup retry overwrites it.
    Incomplete(UserRecord),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub token: String,
    pub uid: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateAccountOutcome {
    Created { uid: String },
    Conflict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed { username: String },
    Unavailable,
    InvalidName(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenameOutcome {
    Renamed {
        from: Option<String>,
        to: String,
    },
    Unavailable,
    InvalidName(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrateOutcome {
    Migrated,
    Conflict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PasswordChangeOutcome {
    Changed,
    WrongPassword,
    NotPasswordAccount,
}
