use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::NotificationError;
use crate::notification::Mailer;
use crate::settings::NotificationConfig;

/// Delivers plain-text mail through an SMTP relay upgraded with STARTTLS.
pub struct SmtpMailer {
    config: NotificationConfig,
}

impl SmtpMailer {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }

    fn sender(&self) -> &str {
        self.config.from.as_deref().unwrap_or(&self.config.smtp_username)
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message, NotificationError> {
        let from: Mailbox = self.sender().parse()?;
        let to: Mailbox = self.config.email.parse()?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let message = self.build_message(subject, body)?;

        let credentials = Credentials::new(
            self.config.smtp_username.clone(),
            self.config.smtp_password.clone(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_server)?
            .port(self.config.smtp_port)
            .credentials(credentials)
            .build();

        transport.send(message).await?;
        Ok(())
    }
}
