use crate::config::MailConfig;
use crate::services::ports::{MailError, MailTransport, OutgoingEmail};
use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// Sends newsletters through an SMTP relay.
#[derive(Clone)]
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl std::fmt::Debug for SmtpMailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailTransport").field("from", &self.from.to_string()).finish_non_exhaustive()
    }
}

impl SmtpMailTransport {
    /// Builds the relay client. No connection is opened until the first send.
    ///
    /// # Errors
    /// Returns `MailError::InvalidAddress` if the sender address is malformed and
    /// `MailError::Transport` if the relay cannot be configured.
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let from = config.from.parse::<Mailbox>().map_err(|e| MailError::InvalidAddress(format!("{}: {e}", config.from)))?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| MailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        let mut builder = builder.port(config.smtp_port).timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self { transport: builder.build(), from })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, MailError> {
        let to = email.to.parse::<Mailbox>().map_err(|e| MailError::InvalidAddress(format!("{}: {e}", email.to)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    #[tracing::instrument(level = "debug", skip(self, email), fields(to = %email.to))]
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = self.build_message(email)?;

        let response = self.transport.send(message).await.map_err(|e| MailError::Transport(e.to_string()))?;
        tracing::debug!(code = %response.code(), "SMTP relay accepted message");
        Ok(())
    }

    async fn check(&self) -> Result<(), MailError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::Transport("SMTP relay did not answer NOOP".to_string())),
            Err(e) => Err(MailError::Transport(e.to_string())),
        }
    }
}
