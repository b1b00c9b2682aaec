//! IdentityRegistry: owns user records, credentials and the username mappings.
//!
//! Keyspace owned here:
//! - `user:id:{uid}`            → UserRecord
//! - `user:credentials:{uid}`   → CredentialRecord (password accounts only)
//! - `user:name:{username}`     → uid
//! - `user:uid:{uid}:username`  → username (forward pointer)
//! - `user:uid:{uid}:claims`    → extra claimed names, released on rename
//!
//! Every multi-key operation is an ordered sequence of single-key writes that is
//! safe to re-run after a crash at any point. A username resolves only when the
//! mapping and the owner's forward pointer agree, so a uid never has more than
//! one resolvable username even while a sequence is half-applied.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::identity::models::{
    Account, AccountLookup, AuthProvider, ClaimOutcome, CreateAccountOutcome, CredentialRecord,
    MigrateOutcome, PasswordChangeOutcome, ProfileUpdate, RenameOutcome, UserRecord,
};
use crate::identity::password::{hash_password, verify_password};
use crate::identity::validation::{normalize_email, normalize_username, validate_password};
use crate::resume::repository::ResumeRepository;
use crate::store::{get_json, keys, set_json, set_json_if_absent, KeyStore, StoreError};

#[derive(Clone)]
pub struct IdentityRegistry {
    store: Arc<dyn KeyStore>,
    resumes: ResumeRepository,
}

impl IdentityRegistry {
    pub fn new(store: Arc<dyn KeyStore>, resumes: ResumeRepository) -> Self {
        Self { store, resumes }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Accounts
    // ────────────────────────────────────────────────────────────────────────

    pub async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, StoreError> {
        get_json(self.store.as_ref(), &keys::user(uid)).await
    }

    async fn get_credentials(&self, uid: &str) -> Result<Option<CredentialRecord>, StoreError> {
        get_json(self.store.as_ref(), &keys::credentials(uid)).await
    }

    pub async fn load_account(&self, uid: &str) -> Result<AccountLookup, StoreError> {
        let Some(user) = self.get_user(uid).await? else {
            return Ok(AccountLookup::NotFound);
        };

        match user.provider {
            AuthProvider::External => Ok(AccountLookup::Found(Account::External { user })),
            AuthProvider::Password => match self.get_credentials(uid).await? {
                Some(credentials) => Ok(AccountLookup::Found(Account::Password {
                    user,
                    credentials,
                })),
                None => Ok(AccountLookup::Incomplete(user)),
            },
        }
    }

    /// Signup. Writes the UserRecord, then the CredentialRecord. A crash between
    /// the two leaves an `Incomplete` account which this call overwrites on retry.
    pub async fn create_with_credentials(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<CreateAccountOutcome, AppError> {
        let uid = normalize_email(email).map_err(AppError::Validation)?;
        validate_password(password).map_err(AppError::Validation)?;

        let overwrite = match self.load_account(&uid).await? {
            AccountLookup::Found(_) => {
                info!("Signup rejected, account {uid} already exists");
                return Ok(CreateAccountOutcome::Conflict);
            }
            AccountLookup::Incomplete(_) => {
                warn!("Overwriting incomplete account {uid}");
                true
            }
            AccountLookup::NotFound => false,
        };

        let password_hash = hash_password(password)?;
        let user = UserRecord::new(&uid, AuthProvider::Password, clean(display_name));

        if overwrite {
            set_json(self.store.as_ref(), &keys::user(&uid), &user).await?;
        } else if !set_json_if_absent(self.store.as_ref(), &keys::user(&uid), &user).await? {
            info!("Signup for {uid} lost a race with a concurrent signup");
            return Ok(CreateAccountOutcome::Conflict);
        }

        let credentials = CredentialRecord {
            uid: uid.clone(),
            password_hash,
            created_at: user.created_at,
            updated_at: user.created_at,
        };
        set_json(self.store.as_ref(), &keys::credentials(&uid), &credentials).await?;

        info!("Created password account {uid}");
        Ok(CreateAccountOutcome::Created { uid })
    }

    /// First successful login through an external identity provider creates the
    /// UserRecord; later logins return the stored one unchanged.
    pub async fn ensure_external_user(
        &self,
        email: &str,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<UserRecord, AppError> {
        let uid = normalize_email(email).map_err(AppError::Validation)?;
        let mut user = UserRecord::new(&uid, AuthProvider::External, clean(display_name));
        user.avatar_url = clean(avatar_url);

        if set_json_if_absent(self.store.as_ref(), &keys::user(&uid), &user).await? {
            info!("Created external-identity account {uid}");
            return Ok(user);
        }

        self.get_user(&uid)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("Account {uid} changed concurrently")))
    }

    pub async fn update_profile(
        &self,
        uid: &str,
        update: ProfileUpdate,
    ) -> Result<UserRecord, AppError> {
        let mut user = self
            .get_user(uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {uid} not found")))?;

        if let Some(name) = update.display_name {
            user.display_name = clean(Some(name));
        }
        if let Some(url) = update.avatar_url {
            let url = clean(Some(url));
            if let Some(u) = &url {
                if !(u.starts_with("https://") || u.starts_with("http://")) {
                    return Err(AppError::Validation(
                        "avatar_url must be an http(s) url".to_string(),
                    ));
                }
            }
            user.avatar_url = url;
        }
        user.updated_at = Utc::now();

        set_json(self.store.as_ref(), &keys::user(uid), &user).await?;
        Ok(user)
    }

    pub async fn change_password(
        &self,
        uid: &str,
        current: &str,
        new_password: &str,
    ) -> Result<PasswordChangeOutcome, AppError> {
        validate_password(new_password).map_err(AppError::Validation)?;

        match self.load_account(uid).await? {
            AccountLookup::Found(Account::Password { credentials, .. }) => {
                if !verify_password(current, &credentials.password_hash)? {
                    return Ok(PasswordChangeOutcome::WrongPassword);
                }
                self.set_password(uid, new_password).await?;
                Ok(PasswordChangeOutcome::Changed)
            }
            AccountLookup::Found(Account::External { .. }) | AccountLookup::Incomplete(_) => {
                Ok(PasswordChangeOutcome::NotPasswordAccount)
            }
            AccountLookup::NotFound => Err(AppError::NotFound(format!("Account {uid} not found"))),
        }
    }

    /// Replaces the password hash. Returns `false` when uid has no credentials.
    pub async fn set_password(&self, uid: &str, new_password: &str) -> Result<bool, AppError> {
        let Some(mut credentials) = self.get_credentials(uid).await? else {
            return Ok(false);
        };
        credentials.password_hash = hash_password(new_password)?;
        credentials.updated_at = Utc::now();
        set_json(self.store.as_ref(), &keys::credentials(uid), &credentials).await?;
        info!("Password updated for {uid}");
        Ok(true)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Usernames
    // ────────────────────────────────────────────────────────────────────────

    /// Point-in-time answer only: another request may claim the name between this
    /// check and a later claim.
    pub async fn check_username_available(&self, raw: &str) -> Result<bool, StoreError> {
        let Ok(name) = normalize_username(raw) else {
            return Ok(false);
        };
        Ok(!self.store.exists(&keys::username(&name)).await?)
    }

    /// Claims `raw` for `uid` with a set-if-absent on the mapping key. Does not look
    /// at other names uid may already hold; the first name claimed stays the
    /// resolvable one until an explicit rename. Any other name is recorded in the
    /// claims list before its mapping is written, so a rename can release it.
    pub async fn claim_username(&self, uid: &str, raw: &str) -> Result<ClaimOutcome, AppError> {
        let name = match normalize_username(raw) {
            Ok(name) => name,
            Err(reason) => return Ok(ClaimOutcome::InvalidName(reason)),
        };
        self.require_user(uid).await?;

        let current = self.get_username_by_uid(uid).await?;
        let extra = current.as_deref().is_some_and(|c| c != name);
        if extra {
            self.record_claim(uid, &name).await?;
        }

        if !self.acquire_mapping(uid, &name).await? {
            if extra {
                self.forget_claim(uid, &name).await?;
            }
            info!("Username '{name}' unavailable for {uid}");
            return Ok(ClaimOutcome::Unavailable);
        }

        if !self
            .store
            .set_if_absent(&keys::username_of(uid), &name)
            .await?
            && !extra
        {
            // Another claim by the same uid set the pointer first; this name is
            // now an extra one.
            let pointer = self.get_username_by_uid(uid).await?;
            if pointer.as_deref() != Some(name.as_str()) {
                self.record_claim(uid, &name).await?;
            }
        }

        info!("Username '{name}' claimed by {uid}");
        Ok(ClaimOutcome::Claimed { username: name })
    }

    /// Claim new → release the old name and every extra claim → move forward
    /// pointer → clear the claims list. A crash before the pointer moves leaves
    /// the pointer on the old name, so re-running the rename finds and finishes it.
    pub async fn rename_username(&self, uid: &str, raw: &str) -> Result<RenameOutcome, AppError> {
        let name = match normalize_username(raw) {
            Ok(name) => name,
            Err(reason) => return Ok(RenameOutcome::InvalidName(reason)),
        };
        self.require_user(uid).await?;

        let current = self.get_username_by_uid(uid).await?;

        if !self.acquire_mapping(uid, &name).await? {
            info!("Rename of {uid} to '{name}' rejected, name taken");
            return Ok(RenameOutcome::Unavailable);
        }

        let mut released = self.pending_claims(uid).await?;
        released.extend(current.clone());
        for old in released.iter().filter(|old| **old != name) {
            let old_key = keys::username(old);
            if self.store.get(&old_key).await?.as_deref() == Some(uid) {
                self.store.delete(&old_key).await?;
                debug!("Released username '{old}' of {uid}");
            }
        }

        self.store.set(&keys::username_of(uid), &name).await?;
        self.store.delete(&keys::username_claims(uid)).await?;

        info!(
            "Username of {uid} renamed from {:?} to '{name}'",
            current.as_deref()
        );
        Ok(RenameOutcome::Renamed {
            from: current,
            to: name,
        })
    }

    pub async fn get_username_by_uid(&self, uid: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&keys::username_of(uid)).await
    }

    /// username → uid, only when the owner's forward pointer agrees.
    pub async fn resolve_username(&self, raw: &str) -> Result<Option<String>, StoreError> {
        let Ok(name) = normalize_username(raw) else {
            return Ok(None);
        };
        let Some(uid) = self.store.get(&keys::username(&name)).await? else {
            return Ok(None);
        };
        match self.get_username_by_uid(&uid).await? {
            Some(current) if current == name => Ok(Some(uid)),
            other => {
                debug!(
                    "Mapping '{name}' → {uid} is not current (pointer {:?})",
                    other.as_deref()
                );
                Ok(None)
            }
        }
    }

    pub async fn get_user_by_username(&self, raw: &str) -> Result<Option<UserRecord>, StoreError> {
        match self.resolve_username(raw).await? {
            Some(uid) => self.get_user(&uid).await,
            None => Ok(None),
        }
    }

    /// Writes `user:name:{name}` → uid if absent. `true` when uid holds the mapping
    /// afterwards, whether this call wrote it or an earlier one did.
    async fn acquire_mapping(&self, uid: &str, name: &str) -> Result<bool, StoreError> {
        let key = keys::username(name);
        if self.store.set_if_absent(&key, uid).await? {
            return Ok(true);
        }
        Ok(self.store.get(&key).await?.as_deref() == Some(uid))
    }

    async fn pending_claims(&self, uid: &str) -> Result<Vec<String>, StoreError> {
        Ok(get_json::<Vec<String>>(self.store.as_ref(), &keys::username_claims(uid))
            .await?
            .unwrap_or_default())
    }

    async fn record_claim(&self, uid: &str, name: &str) -> Result<(), StoreError> {
        let mut claims = self.pending_claims(uid).await?;
        if !claims.iter().any(|c| c == name) {
            claims.push(name.to_string());
            set_json(self.store.as_ref(), &keys::username_claims(uid), &claims).await?;
        }
        Ok(())
    }

    async fn forget_claim(&self, uid: &str, name: &str) -> Result<(), StoreError> {
        let mut claims = self.pending_claims(uid).await?;
        claims.retain(|c| c != name);
        if claims.is_empty() {
            self.store.delete(&keys::username_claims(uid)).await?;
        } else {
            set_json(self.store.as_ref(), &keys::username_claims(uid), &claims).await?;
        }
        Ok(())
    }

    async fn require_user(&self, uid: &str) -> Result<(), AppError> {
        if self.store.exists(&keys::user(uid)).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Account {uid} not found")))
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Email change
    // ────────────────────────────────────────────────────────────────────────

    /// Re-keys every record of `old_uid` under the uid derived from `new_email`.
    ///
    /// 1. Fail fast when the destination belongs to someone else.
    /// 2. Copy: UserRecord (tagged `migrated_from`), CredentialRecord, forward
    ///    pointer, username mapping (re-pointed), extra claims (re-pointed),
    ///    ResumeDocument. Pure overwrites.
    /// 3. Delete the old keys, UserRecord last. Pure deletes.
    ///
    /// Not atomic. A crash between 2 and 3 leaves both identities live, and
    /// re-running this call completes it. The destination only counts as an
    /// unfinished copy while it is tagged with `old_uid` and carries the source's
    /// `created_at`; an account later created under `old_uid` cannot resume into
    /// it. Running it after completion is a no-op.
    pub async fn migrate_identity(
        &self,
        old_uid: &str,
        new_email: &str,
    ) -> Result<MigrateOutcome, AppError> {
        let new_uid = normalize_email(new_email).map_err(AppError::Validation)?;
        if new_uid == old_uid {
            return Err(AppError::Validation(
                "New email matches the current one".to_string(),
            ));
        }

        let source = self.get_user(old_uid).await?;
        let dest = self.get_user(&new_uid).await?;

        let (source, resuming) = match (source, dest) {
            (None, Some(dest)) if dest.migrated_from.as_deref() == Some(old_uid) => {
                info!("Migration {old_uid} → {new_uid} already complete");
                return Ok(MigrateOutcome::Migrated);
            }
            (None, _) => {
                return Err(AppError::NotFound(format!("Account {old_uid} not found")));
            }
            (Some(source), Some(dest)) if is_unfinished_copy(&source, &dest) => (source, true),
            (Some(_), Some(_)) => {
                info!("Migration {old_uid} → {new_uid} rejected, destination exists");
                return Ok(MigrateOutcome::Conflict);
            }
            (Some(source), None) => (source, false),
        };

        if resuming {
            warn!("Resuming partial migration {old_uid} → {new_uid}");
        }

        // Copy phase
        let mut moved = source;
        moved.uid = new_uid.clone();
        moved.migrated_from = Some(old_uid.to_string());
        moved.updated_at = Utc::now();

        let user_key = keys::user(&new_uid);
        if resuming {
            set_json(self.store.as_ref(), &user_key, &moved).await?;
        } else if !set_json_if_absent(self.store.as_ref(), &user_key, &moved).await? {
            info!("Migration {old_uid} → {new_uid} lost a race for the destination");
            return Ok(MigrateOutcome::Conflict);
        }

        if let Some(mut credentials) = self.get_credentials(old_uid).await? {
            credentials.uid = new_uid.clone();
            set_json(
                self.store.as_ref(),
                &keys::credentials(&new_uid),
                &credentials,
            )
            .await?;
        }

        if let Some(name) = self.get_username_by_uid(old_uid).await? {
            self.store.set(&keys::username_of(&new_uid), &name).await?;
            let mapping_key = keys::username(&name);
            match self.store.get(&mapping_key).await? {
                Some(owner) if owner == old_uid || owner == new_uid => {
                    self.store.set(&mapping_key, &new_uid).await?;
                }
                other => warn!(
                    "Mapping '{name}' points at {:?}, not re-pointing to {new_uid}",
                    other.as_deref()
                ),
            }
        }

        let claims = self.pending_claims(old_uid).await?;
        for name in &claims {
            let mapping_key = keys::username(name);
            if let Some(owner) = self.store.get(&mapping_key).await? {
                if owner == old_uid {
                    self.store.set(&mapping_key, &new_uid).await?;
                }
            }
        }
        if !claims.is_empty() {
            set_json(
                self.store.as_ref(),
                &keys::username_claims(&new_uid),
                &claims,
            )
            .await?;
        }

        self.resumes.copy_to(old_uid, &new_uid).await?;

        // Delete phase
        self.store.delete(&keys::credentials(old_uid)).await?;
        self.store.delete(&keys::username_claims(old_uid)).await?;
        self.store.delete(&keys::username_of(old_uid)).await?;
        self.resumes.remove(old_uid).await?;
        self.store.delete(&keys::user(old_uid)).await?;

        info!("Migrated identity {old_uid} → {new_uid}");
        Ok(MigrateOutcome::Migrated)
    }
}

/// `dest` is the copy-phase output of migrating `source`, not an account that
/// merely once came from the same uid.
fn is_unfinished_copy(source: &UserRecord, dest: &UserRecord) -> bool {
    dest.migrated_from.as_deref() == Some(source.uid.as_str())
        && dest.created_at == source.created_at
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
