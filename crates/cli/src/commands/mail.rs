//! Mail configuration check.
//!
//! # Usage
//!
//! ```bash
//! ballerz mail test -t me@example.com
//! ```
//!
//! Uses the same `EMAIL_*` and `SMTP_*` variables as the storefront.

use ballerz_storefront::config::{ConfigError, EmailConfig};
use ballerz_storefront::services::email::{EmailError, Mailer};
use thiserror::Error;

/// Errors that can occur while checking mail settings.
#[derive(Debug, Error)]
pub enum MailCheckError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Email is not configured: set EMAIL_USER and EMAIL_PASS")]
    NotConfigured,

    #[error(transparent)]
    Email(#[from] EmailError),
}

/// Send a test message to `to` with the configured SMTP account.
///
/// # Errors
///
/// Returns an error if email is not configured or sending fails.
pub async fn test(to: &str) -> Result<(), MailCheckError> {
    dotenvy::dotenv().ok();

    let config = EmailConfig::from_env()?.ok_or(MailCheckError::NotConfigured)?;
    tracing::info!(
        host = %config.smtp_host,
        port = config.smtp_port,
        from = %config.from_mailbox(),
        "Sending test message"
    );

    Mailer::new(&config)?.send_test(to).await?;

    tracing::info!("Test message sent to {to}");
    Ok(())
}
