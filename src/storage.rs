use async_trait::async_trait;
use itertools::Itertools;
use log::{error, info};
use std::path::PathBuf;

pub mod flat_file;
pub mod row_store;
pub mod spreadsheet;

use crate::error::{PersistenceError, SinkKind};
use crate::mail_reader::MessageRecord;
use crate::settings::Config;

pub const CSV_FILE_NAME: &str = "emails.csv";
pub const SPREADSHEET_FILE_NAME: &str = "emails.xlsx";

/// Column order shared by every sink.
pub const COLUMNS: [&str; 8] = [
    "uid",
    "message_id",
    "received",
    "sender",
    "subject",
    "body",
    "attachment_count",
    "attachments",
];

pub type Row = [String; 8];

pub fn to_row(record: &MessageRecord) -> Row {
    [
        record.uid.to_string(),
        record.message_id.clone().unwrap_or_default(),
        record.received.to_rfc3339(),
        record.sender.clone(),
        record.subject.clone(),
        record.body.clone(),
        record.attachments.len().to_string(),
        attachment_paths(record),
    ]
}

pub fn attachment_paths(record: &MessageRecord) -> String {
    record
        .attachments
        .iter()
        .map(|attachment| attachment.path.display().to_string())
        .join(";")
}

/// The three destinations a batch is written to.
///
/// Each write stands alone: [`Persistence::save_all`] attempts all of them in
/// order and returns whatever failed.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn append_to_flat_file(&self, batch: &[MessageRecord]) -> Result<(), PersistenceError>;

    async fn append_to_spreadsheet(&self, batch: &[MessageRecord]) -> Result<(), PersistenceError>;

    async fn append_to_row_store(&self, batch: &[MessageRecord]) -> Result<(), PersistenceError>;

    async fn save_all(&self, batch: &[MessageRecord]) -> Vec<PersistenceError> {
        let results = [
            self.append_to_flat_file(batch).await,
            self.append_to_spreadsheet(batch).await,
            self.append_to_row_store(batch).await,
        ];

        let errors: Vec<PersistenceError> = results.into_iter().filter_map(Result::err).collect();
        for e in &errors {
            error!("Failed to save emails: {}", e);
        }
        errors
    }
}

pub struct Storage {
    output_dir: PathBuf,
    db_connection_string: String,
}

impl Storage {
    pub fn new(output_dir: PathBuf, db_connection_string: String) -> Self {
        Self {
            output_dir,
            db_connection_string,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.paths.output_dir.clone(),
            config.storage.db_connection_string.clone(),
        )
    }

    async fn ensure_output_dir(&self, sink: SinkKind) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| PersistenceError::new(sink, e))
    }
}

#[async_trait]
impl Persistence for Storage {
    async fn append_to_flat_file(&self, batch: &[MessageRecord]) -> Result<(), PersistenceError> {
        self.ensure_output_dir(SinkKind::FlatFile).await?;
        let path = self.output_dir.join(CSV_FILE_NAME);
        let rows: Vec<Row> = batch.iter().map(to_row).collect();
        let written = rows.len();

        tokio::task::spawn_blocking(move || flat_file::append_rows(&path, &rows))
            .await
            .map_err(|e| PersistenceError::new(SinkKind::FlatFile, e))?
            .map_err(|e| PersistenceError::new(SinkKind::FlatFile, e))?;

        info!("Saved {} emails to {}", written, CSV_FILE_NAME);
        Ok(())
    }

    async fn append_to_spreadsheet(&self, batch: &[MessageRecord]) -> Result<(), PersistenceError> {
        self.ensure_output_dir(SinkKind::Spreadsheet).await?;
        let path = self.output_dir.join(SPREADSHEET_FILE_NAME);
        let rows: Vec<Row> = batch.iter().map(to_row).collect();
        let written = rows.len();

        tokio::task::spawn_blocking(move || spreadsheet::append_rows(&path, &rows))
            .await
            .map_err(|e| PersistenceError::new(SinkKind::Spreadsheet, e))?
            .map_err(|e| PersistenceError::new(SinkKind::Spreadsheet, e))?;

        info!("Saved {} emails to {}", written, SPREADSHEET_FILE_NAME);
        Ok(())
    }

    async fn append_to_row_store(&self, batch: &[MessageRecord]) -> Result<(), PersistenceError> {
        row_store::append_records(&self.db_connection_string, batch)
            .await
            .map_err(|e| PersistenceError::new(SinkKind::RowStore, e))?;

        info!("Saved {} emails to database", batch.len());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mail_reader::message::AttachmentRef;
    use chrono::{TimeZone, Utc};

    pub(crate) fn record(uid: u32, subject: &str) -> MessageRecord {
        MessageRecord {
            uid,
            message_id: Some(format!("<{uid}@example.com>")),
            sender: "Alice <alice@example.com>".to_string(),
            subject: subject.to_string(),
            received: Utc.with_ymd_and_hms(2025, 7, 1, 8, 30, 0).unwrap(),
            body: "Hello,\nsee attached.".to_string(),
            attachments: vec![
                AttachmentRef {
                    filename: "a.pdf".to_string(),
                    path: PathBuf::from(format!("/data/{uid}_0_a.pdf")),
                },
                AttachmentRef {
                    filename: "b.png".to_string(),
                    path: PathBuf::from(format!("/data/{uid}_1_b.png")),
                },
            ],
        }
    }

    #[test]
    fn row_follows_column_order() {
        let row = to_row(&record(3, "Report"));
        assert_eq!(row[0], "3");
        assert_eq!(row[1], "<3@example.com>");
        assert_eq!(row[2], "2025-07-01T08:30:00+00:00");
        assert_eq!(row[4], "Report");
        assert_eq!(row[6], "2");
        assert_eq!(row[7], "/data/3_0_a.pdf;/data/3_1_b.png");
    }

    #[tokio::test]
    async fn storage_writes_all_three_sinks() {
        let tmp = tempfile::tempdir().unwrap();
        let output_dir = tmp.path().join("output");
        let db = format!("sqlite://{}", output_dir.join("emails.db").display());
        let storage = Storage::new(output_dir.clone(), db.clone());

        let errors = storage.save_all(&[record(1, "one"), record(2, "two")]).await;

        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert!(output_dir.join(CSV_FILE_NAME).exists());
        assert!(output_dir.join(SPREADSHEET_FILE_NAME).exists());
        assert_eq!(row_store::count_rows(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failing_sinks_do_not_block_the_others() {
        let tmp = tempfile::tempdir().unwrap();
        // A plain file where the output directory should be breaks the file sinks
        let blocked = tmp.path().join("blocked");
        std::fs::write(&blocked, b"not a directory").unwrap();
        let db = format!("sqlite://{}", tmp.path().join("emails.db").display());
        let storage = Storage::new(blocked, db.clone());

        let errors = storage.save_all(&[record(1, "one")]).await;

        let failed: Vec<SinkKind> = errors.iter().map(|e| e.sink).collect();
        assert_eq!(failed, vec![SinkKind::FlatFile, SinkKind::Spreadsheet]);
        assert_eq!(row_store::count_rows(&db).await.unwrap(), 1);
    }
}
