use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;

use crate::mail_reader::MessageRecord;
use crate::storage::attachment_paths;

async fn connect(connection_string: &str) -> Result<SqliteConnection, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(connection_string)?.create_if_missing(true);
    SqliteConnection::connect_with(&options).await
}

async fn initialize(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS emails (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uid INTEGER NOT NULL,
            message_id TEXT,
            received TEXT NOT NULL,
            sender TEXT NOT NULL DEFAULT '',
            subject TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            attachment_count INTEGER NOT NULL DEFAULT 0,
            attachments TEXT NOT NULL DEFAULT '',
            stored_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        ",
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Inserts one row per record into `emails`, creating the table on first use.
///
/// All rows of a batch go in under one transaction.
pub async fn append_records(connection_string: &str, batch: &[MessageRecord]) -> Result<(), sqlx::Error> {
    let mut conn = connect(connection_string).await?;
    initialize(&mut conn).await?;

    let mut tx = conn.begin().await?;
    for record in batch {
        sqlx::query(
            r"
            INSERT INTO emails (uid, message_id, received, sender, subject, body, attachment_count, attachments)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(i64::from(record.uid))
        .bind(record.message_id.as_deref())
        .bind(record.received.to_rfc3339())
        .bind(&record.sender)
        .bind(&record.subject)
        .bind(&record.body)
        .bind(i64::try_from(record.attachments.len()).unwrap_or(i64::MAX))
        .bind(attachment_paths(record))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    conn.close().await
}

#[cfg(test)]
pub(crate) async fn count_rows(connection_string: &str) -> Result<i64, sqlx::Error> {
    let mut conn = connect(connection_string).await?;
    sqlx::query_scalar("SELECT COUNT(*) FROM emails")
        .fetch_one(&mut conn)
        .await
}
