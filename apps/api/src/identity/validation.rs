//! Input policy for the identity aliases: usernames, emails (which double as
//! uids) and passwords.

use std::sync::OnceLock;

use regex::Regex;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

/// Names that collide with application routes.
const RESERVED_USERNAMES: &[&str] = &["admin", "api", "www", "settings", "login", "signup"];

/// Normalizes a requested username. Usernames are case-insensitive: the stored
/// form is lowercase, so `Alice` and `alice` are the same claim.
pub fn normalize_username(raw: &str) -> Result<String, String> {
    let name = raw.trim().to_lowercase();

    if name.chars().count() < USERNAME_MIN_LEN {
        return Err(format!(
            "Username must be at least {USERNAME_MIN_LEN} characters long"
        ));
    }

    if name.chars().count() > USERNAME_MAX_LEN {
        return Err(format!(
            "Username must be at most {USERNAME_MAX_LEN} characters long"
        ));
    }

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("Failed to compile username regex")
    });

    if !regex.is_match(&name) {
        return Err(
            "Username may contain letters, numbers, '_' and '-', and must start with a letter or number"
                .to_string(),
        );
    }

    if RESERVED_USERNAMES.contains(&name.as_str()) {
        return Err(format!("Username '{name}' is reserved"));
    }

    Ok(name)
}

/// Normalizes an email into the uid form (trimmed, lowercase).
pub fn normalize_email(raw: &str) -> Result<String, String> {
    let email = raw.trim().to_lowercase();

    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(&email) {
        return Err("Invalid email format".to_string());
    }

    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < PASSWORD_MIN_LEN {
        return Err(format!(
            "Password must be at least {PASSWORD_MIN_LEN} characters long"
        ));
    }

    if password.len() > PASSWORD_MAX_LEN {
        return Err(format!(
            "Password must be at most {PASSWORD_MAX_LEN} characters long"
        ));
    }

    if password.trim().is_empty() {
        return Err("Password cannot be blank".to_string());
    }

    Ok(())
}
