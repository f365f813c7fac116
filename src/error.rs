use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open settings file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Failures while retrieving mail from the configured account.
#[derive(Debug, Error)]
pub enum MailSourceError {
    #[error("cannot connect to {server}:{port}: {source}")]
    Connect {
        server: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("login failed for {username}: {source}")]
    Login {
        username: String,
        #[source]
        source: async_imap::error::Error,
    },

    #[error("IMAP error: {0}")]
    Protocol(#[from] async_imap::error::Error),

    #[error("malformed message {uid}: {source}")]
    Parse {
        uid: u32,
        #[source]
        source: mailparse::MailParseError,
    },

    #[error("cannot save attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    FlatFile,
    Spreadsheet,
    RowStore,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkKind::FlatFile => "csv",
            SinkKind::Spreadsheet => "spreadsheet",
            SinkKind::RowStore => "database",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SinkFailure {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] umya_spreadsheet::XlsxError),

    #[error("workbook has no worksheet")]
    MissingSheet,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("writer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A write to one sink failed. The other sinks are unaffected.
#[derive(Debug, Error)]
#[error("{sink} sink failed: {source}")]
pub struct PersistenceError {
    pub sink: SinkKind,
    #[source]
    pub source: SinkFailure,
}

impl PersistenceError {
    pub fn new(sink: SinkKind, source: impl Into<SinkFailure>) -> Self {
        Self {
            sink,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("cannot build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Anything that can go wrong during one pass, tagged by origin.
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    MailSource(#[from] MailSourceError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
