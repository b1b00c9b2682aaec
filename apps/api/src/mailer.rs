//! Outbound email collaborator. Delivery is owned by an external service; this
//! crate only decides what to send.

use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(&self, to: &str, reset_url: &str) -> anyhow::Result<()>;
}

/// Default mailer: records that a message was due in the service log instead of
/// sending it. The link carries a bearer token, so only its page is logged.
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send_password_reset(&self, to: &str, reset_url: &str) -> anyhow::Result<()> {
        info!(to, reset_page = without_query(reset_url), "password reset email queued");
        Ok(())
    }
}

fn without_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(page, _)| page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logged_link_drops_token() {
        let logged = without_query("https://folio.example/reset-password?token=abc123");
        assert_eq!(logged, "https://folio.example/reset-password");
        assert!(!logged.contains("abc123"));
    }

    #[test]
    fn test_link_without_query_is_unchanged() {
        assert_eq!(
            without_query("https://folio.example/reset-password"),
            "https://folio.example/reset-password"
        );
    }
}
