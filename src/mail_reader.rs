use async_trait::async_trait;
use itertools::Itertools;
use log::{error, info, warn};
use std::path::PathBuf;

pub mod attachments;
pub mod imap;
pub mod message;

pub use message::MessageRecord;

use crate::error::MailSourceError;
use crate::settings::ImapConfig;

/// The records produced by one pass, in fetch order.
pub type Batch = Vec<MessageRecord>;

#[async_trait]
pub trait MailSource: Send {
    /// Returns the messages that are new since the last pass; empty when there are none.
    async fn get_emails(&mut self) -> Result<Batch, MailSourceError>;
}

pub struct ImapMailSource {
    config: ImapConfig,
    attachments_dir: PathBuf,
}

impl ImapMailSource {
    pub fn new(config: ImapConfig, attachments_dir: PathBuf) -> Self {
        Self {
            config,
            attachments_dir,
        }
    }

    async fn process(&self, fetched: imap::FetchedMessage) -> Result<MessageRecord, MailSourceError> {
        let parsed = message::parse_message(fetched.uid, &fetched.raw, fetched.internal_date)
            .map_err(|source| MailSourceError::Parse {
                uid: fetched.uid,
                source,
            })?;
        let saved = attachments::save_attachments(&self.attachments_dir, parsed.uid, &parsed.attachments).await?;
        if !saved.is_empty() {
            info!(
                "-- message {} attachments: {}",
                parsed.uid,
                saved.iter().map(|attachment| attachment.filename.as_str()).join(", ")
            );
        }
        Ok(parsed.into_record(saved))
    }

    /// Turns fetched messages into records. A message that cannot be parsed or
    /// whose attachments cannot be written is left out of the batch.
    async fn process_all(&self, fetched: Vec<imap::FetchedMessage>) -> Batch {
        let mut batch = Batch::with_capacity(fetched.len());
        for message in fetched {
            let uid = message.uid;
            match self.process(message).await {
                Ok(record) => batch.push(record),
                Err(e) => error!("Skipping message {}, it stays unseen: {}", uid, e),
            }
        }
        batch
    }

    async fn retrieve(&self, imap_session: &mut imap::ImapSession) -> Result<Batch, MailSourceError> {
        let fetched = imap::fetch_unseen(imap_session, &self.config.mailbox, self.config.max_messages).await?;
        let batch = self.process_all(fetched).await;

        let uids: Vec<u32> = batch.iter().map(|record| record.uid).collect();
        imap::mark_seen(imap_session, &uids).await?;
        Ok(batch)
    }
}

#[async_trait]
impl MailSource for ImapMailSource {
    async fn get_emails(&mut self) -> Result<Batch, MailSourceError> {
        let mut imap_session = imap::create_session(&self.config).await?;

        let retrieved = self.retrieve(&mut imap_session).await;

        // Be nice to the server and log out
        if let Err(e) = imap_session.logout().await {
            warn!("IMAP logout failed: {}", e);
        }

        let batch = retrieved?;
        info!("Retrieved {} new emails from {}", batch.len(), self.config.mailbox);
        Ok(batch)
    }
}
