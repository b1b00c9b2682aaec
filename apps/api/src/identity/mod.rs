//! Accounts, credentials, usernames and the email-change migration.

pub mod handlers;
pub mod models;
pub mod password;
pub mod registry;
pub mod reset;
pub mod validation;
