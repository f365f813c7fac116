use async_trait::async_trait;
use itertools::Itertools;
use log::{error, info};
use std::fmt::Display;

pub mod smtp;

use crate::error::NotificationError;
use crate::mail_reader::MessageRecord;
use crate::settings::NotificationConfig;

pub const ERROR_SUBJECT: &str = "Email Scraper Error";

/// Outbound mail delivery used by [`Notifier`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError>;
}

pub struct Notifier {
    enabled: bool,
    mailer: Box<dyn Mailer>,
}

pub fn summary_subject(processed: usize) -> String {
    format!("Email Scraper Summary - {} Processed", processed)
}

pub fn summary_body<E: Display>(processed: usize, errors: &[E]) -> String {
    let mut body = format!("Processed {} emails\n\n", processed);
    if !errors.is_empty() {
        body.push_str(&format!("Errors ({}):\n", errors.len()));
        body.push_str(&errors.iter().map(|e| format!("- {}", e)).join("\n"));
    }
    body
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self::with_mailer(config.enabled, Box::new(smtp::SmtpMailer::new(config.clone())))
    }

    pub fn with_mailer(enabled: bool, mailer: Box<dyn Mailer>) -> Self {
        Self { enabled, mailer }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sends one email. Never fails the caller: returns `false` when disabled
    /// (without touching the network) or when delivery fails.
    pub async fn send_notification(&self, subject: &str, body: &str) -> bool {
        if !self.enabled {
            return false;
        }

        match self.mailer.send(subject, body).await {
            Ok(()) => {
                info!("Sent notification: {}", subject);
                true
            }
            Err(e) => {
                error!("Failed to send notification: {}", e);
                false
            }
        }
    }

    /// Reports how many messages a pass processed and which errors it collected.
    ///
    /// Nothing is sent for an empty batch without errors.
    pub async fn send_summary<E: Display>(&self, batch: &[MessageRecord], errors: &[E]) -> bool {
        if batch.is_empty() && errors.is_empty() {
            return false;
        }

        let subject = summary_subject(batch.len());
        let body = summary_body(batch.len(), errors);
        self.send_notification(&subject, &body).await
    }

    pub async fn send_error<E: Display>(&self, error: &E) -> bool {
        self.send_notification(ERROR_SUBJECT, &format!("Error occurred: {}", error))
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::tests::record;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub(crate) struct RecordingMailer {
        pub sent: Arc<Mutex<Vec<(String, String)>>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub(crate) fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            if self.fail {
                let err = "not an address".parse::<lettre::Address>().unwrap_err();
                return Err(err.into());
            }
            Ok(())
        }
    }

    fn notifier(enabled: bool) -> (Notifier, RecordingMailer) {
        let mailer = RecordingMailer::default();
        (Notifier::with_mailer(enabled, Box::new(mailer.clone())), mailer)
    }

    #[tokio::test]
    async fn disabled_notifier_never_calls_mailer() {
        let (notifier, mailer) = notifier(false);
        assert!(!notifier.send_notification("subject", "body").await);
        assert!(!notifier.send_summary(&[record(1, "a")], &["boom"]).await);
        assert!(!notifier.send_error(&"boom").await);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn summary_is_skipped_only_for_empty_batch_without_errors() {
        let (notifier, mailer) = notifier(true);
        let no_errors: [&str; 0] = [];

        assert!(!notifier.send_summary(&[], &no_errors).await);
        assert!(mailer.sent().is_empty());

        assert!(notifier.send_summary(&[record(1, "a")], &no_errors).await);
        assert!(notifier.send_summary(&[], &["database sink failed"]).await);
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn summary_lists_errors() {
        let (notifier, mailer) = notifier(true);
        let batch = [record(1, "a"), record(2, "b"), record(3, "c")];

        assert!(notifier.send_summary(&batch, &["csv sink failed", "database sink failed"]).await);

        let (subject, body) = &mailer.sent()[0];
        assert_eq!(subject, "Email Scraper Summary - 3 Processed");
        assert_eq!(
            body,
            "Processed 3 emails\n\nErrors (2):\n- csv sink failed\n- database sink failed"
        );
    }

    #[tokio::test]
    async fn delivery_failure_returns_false() {
        let mailer = RecordingMailer {
            fail: true,
            ..Default::default()
        };
        let notifier = Notifier::with_mailer(true, Box::new(mailer.clone()));
        assert!(!notifier.send_notification("subject", "body").await);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn error_notification_carries_message() {
        let (notifier, mailer) = notifier(true);
        assert!(notifier.send_error(&"connection refused").await);
        assert_eq!(
            mailer.sent(),
            vec![(ERROR_SUBJECT.to_string(), "Error occurred: connection refused".to_string())]
        );
    }

    #[test]
    fn summary_body_without_errors() {
        let no_errors: [String; 0] = [];
        assert_eq!(summary_body(5, &no_errors), "Processed 5 emails\n\n");
    }
}
