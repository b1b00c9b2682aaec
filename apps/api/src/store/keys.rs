// Logical key layout for the shared keyspace. Every key is built here.

pub const USERNAME_PREFIX: &str = "user:name:";
pub const USERNAME_PATTERN: &str = "user:name:*";

/// `user:id:{uid}` → UserRecord
pub fn user(uid: &str) -> String {
    format!("user:id:{uid}")
}

/// `user:credentials:{uid}` → CredentialRecord
pub fn credentials(uid: &str) -> String {
    format!("user:credentials:{uid}")
}

/// `user:name:{username}` → uid
pub fn username(name: &str) -> String {
    format!("{USERNAME_PREFIX}{name}")
}

/// `user:uid:{uid}:username` → current username of uid
pub fn username_of(uid: &str) -> String {
    format!("user:uid:{uid}:username")
}

/// `user:uid:{uid}:claims` → JSON list of extra names uid claimed besides its
/// current one, released on the next rename
pub fn username_claims(uid: &str) -> String {
    format!("user:uid:{uid}:claims")
}

/// `resume:{uid}` → ResumeDocument
pub fn resume(uid: &str) -> String {
    format!("resume:{uid}")
}

/// `password-reset:{token}` → PasswordResetToken (TTL-bound)
pub fn password_reset(token: &str) -> String {
    format!("password-reset:{token}")
}

/// Recovers the username from a `user:name:{username}` key.
pub fn username_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(USERNAME_PREFIX).filter(|n| !n.is_empty())
}
