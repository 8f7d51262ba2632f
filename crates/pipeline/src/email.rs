//! Digest delivery via SMTP.
//!
//! The transport is injected behind [`EmailSender`] so the dispatcher can
//! be driven by a mock in tests; [`SmtpSender`] wraps the `lettre` async
//! SMTP transport for production. Configuration is loaded from
//! environment variables; if `SMTP_HOST` is not set,
//! [`EmailConfig::from_env`] returns `None` and dispatch is disabled.

use centinela_db::models::digest::Digest;
use centinela_db::repositories::DigestRepo;
use centinela_db::DbPool;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "alerts@centinela.local";

/// Configuration for the SMTP digest delivery service.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// Use implicit TLS instead of STARTTLS (`SMTP_SECURE=true`).
    pub smtp_secure: bool,
    /// RFC 5322 "From" address.
    pub from_address: String,
    /// Optional SMTP username.
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    pub smtp_password: Option<String>,
    /// Where digests are sent (`ALERT_RECIPIENT_EMAIL`).
    pub recipient: String,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured and the send stage should be skipped.
    ///
    /// | Variable                | Required | Default                   |
    /// |-------------------------|----------|---------------------------|
    /// | `SMTP_HOST`             | yes      | --                         |
    /// | `SMTP_PORT`             | no       | `587`                     |
    /// | `SMTP_SECURE`           | no       | `false`                   |
    /// | `SMTP_FROM`             | no       | `alerts@centinela.local`  |
    /// | `SMTP_USER`             | no       | --                         |
    /// | `SMTP_PASS`             | no       | --                         |
    /// | `ALERT_RECIPIENT_EMAIL` | no       | `SMTP_FROM` value         |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        let from_address =
            std::env::var("SMTP_FROM").unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string());
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            smtp_secure: std::env::var("SMTP_SECURE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            recipient: std::env::var("ALERT_RECIPIENT_EMAIL")
                .unwrap_or_else(|_| from_address.clone()),
            from_address,
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASS").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailSender
// ---------------------------------------------------------------------------

/// An injected mail transport.
pub trait EmailSender: Send + Sync {
    /// Send one message; returns the provider message id when available.
    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, EmailError>> + Send;
}

/// Production transport over lettre's async SMTP client.
pub struct SmtpSender {
    config: EmailConfig,
}

impl SmtpSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

impl EmailSender for SmtpSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<Option<String>, EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder = if self.config.smtp_secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)?
                .port(self.config.smtp_port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port)
        };

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        let response = mailer.send(email).await?;

        let message_id = response.message().next().map(|line| line.to_string());
        tracing::info!(to, subject, "Digest email sent");
        Ok(message_id)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Outcome of one dispatch pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchSummary {
    pub sent: u64,
    pub failed: u64,
}

/// Sends every not-yet-delivered digest and records the outcome.
pub struct EmailDispatcher<S: EmailSender> {
    pool: DbPool,
    sender: S,
    recipient: String,
}

impl<S: EmailSender> EmailDispatcher<S> {
    pub fn new(pool: DbPool, sender: S, recipient: impl Into<String>) -> Self {
        Self {
            pool,
            sender,
            recipient: recipient.into(),
        }
    }

    /// Send all digests that have no `sent` delivery row yet.
    ///
    /// A failed attempt records a `failed` row; the digest remains
    /// eligible and the next tick retries it.
    pub async fn dispatch_pending(&self) -> Result<DispatchSummary, sqlx::Error> {
        let pending = DigestRepo::list_unsent(&self.pool).await?;
        let mut summary = DispatchSummary::default();

        for digest in pending {
            // Re-check inside the loop: an earlier iteration (or another
            // instance) may have delivered it since the list was read.
            if DigestRepo::has_sent_delivery(&self.pool, digest.id).await? {
                continue;
            }
            self.dispatch_one(&digest, &mut summary).await?;
        }

        if summary.sent > 0 || summary.failed > 0 {
            tracing::info!(sent = summary.sent, failed = summary.failed, "Digest dispatch complete");
        }
        Ok(summary)
    }

    async fn dispatch_one(
        &self,
        digest: &Digest,
        summary: &mut DispatchSummary,
    ) -> Result<(), sqlx::Error> {
        match self
            .sender
            .send(&self.recipient, &digest.subject, &digest.body_text)
            .await
        {
            Ok(message_id) => {
                DigestRepo::record_sent(
                    &self.pool,
                    digest.id,
                    digest.tenant_id,
                    &self.recipient,
                    message_id.as_deref(),
                )
                .await?;
                summary.sent += 1;
            }
            Err(e) => {
                tracing::warn!(digest_id = digest.id, error = %e, "Digest delivery failed");
                DigestRepo::record_failed(
                    &self.pool,
                    digest.id,
                    digest.tenant_id,
                    &self.recipient,
                    &e.to_string(),
                )
                .await?;
                summary.failed += 1;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
