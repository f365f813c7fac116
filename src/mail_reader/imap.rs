use std::collections::HashSet;

use async_imap::{Client, Session};
use chrono::{DateTime, FixedOffset};
use futures::TryStreamExt;
use itertools::Itertools;
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::error::MailSourceError;
use crate::settings::ImapConfig;
use log::{info, warn};

pub type ImapSession = Session<Compat<TlsStream<TcpStream>>>;

/// A message as downloaded, before any parsing.
#[derive(Debug)]
pub struct FetchedMessage {
    pub uid: u32,
    pub raw: Vec<u8>,
    pub internal_date: Option<DateTime<FixedOffset>>,
}

// Establish a TLS-encrypted connection to the IMAP server
async fn connect_to_server(server: &str, port: u16) -> Result<TlsStream<TcpStream>, MailSourceError> {
    let tcp_stream = TcpStream::connect((server, port))
        .await
        .map_err(|source| MailSourceError::Connect {
            server: server.to_string(),
            port,
            source,
        })?;
    let tls = tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);
    let tls_stream = tls.connect(server, tcp_stream).await?;

    info!("-- connected to {}:{}", server, port);
    Ok(tls_stream)
}

// Login to the IMAP server and return an authenticated session
async fn login_to_server(
    client: Client<Compat<TlsStream<TcpStream>>>,
    username: &str,
    password: &str,
) -> Result<ImapSession, MailSourceError> {
    let imap_session = client
        .login(username, password)
        .await
        .map_err(|(source, _client)| MailSourceError::Login {
            username: username.to_string(),
            source,
        })?;

    info!("-- logged in as {}", username);
    Ok(imap_session)
}

pub async fn create_session(config: &ImapConfig) -> Result<ImapSession, MailSourceError> {
    let tls_stream = connect_to_server(&config.server, config.port).await?;
    let client = Client::new(tls_stream.compat());
    login_to_server(client, &config.username, &config.password).await
}

// Oldest first, capped to the per-pass limit
fn select_uids(found: HashSet<u32>, max_messages: Option<usize>) -> Vec<u32> {
    let mut uids: Vec<u32> = found.into_iter().sorted_unstable().collect();
    if let Some(max) = max_messages {
        uids.truncate(max);
    }
    uids
}

fn uid_set(uids: &[u32]) -> String {
    uids.iter().join(",")
}

/// Downloads every unseen message in `mailbox` without changing its flags.
///
/// The body is fetched with `BODY.PEEK[]`; a message only becomes `\Seen`
/// through [`mark_seen`] once it has been turned into a record.
pub async fn fetch_unseen(
    session: &mut ImapSession,
    mailbox: &str,
    max_messages: Option<usize>,
) -> Result<Vec<FetchedMessage>, MailSourceError> {
    session.select(mailbox).await?;
    info!("-- {} selected", mailbox);

    let uids = select_uids(session.uid_search("UNSEEN").await?, max_messages);
    if uids.is_empty() {
        return Ok(Vec::new());
    }
    info!("-- {} unseen messages", uids.len());

    let messages_stream = session
        .uid_fetch(uid_set(&uids), "(UID INTERNALDATE BODY.PEEK[])")
        .await?;
    let messages: Vec<_> = messages_stream.try_collect().await?;

    let mut fetched = Vec::with_capacity(messages.len());
    for message in &messages {
        let (Some(uid), Some(body)) = (message.uid, message.body()) else {
            warn!("Skipping fetch response without UID or body (seq {})", message.message);
            continue;
        };
        fetched.push(FetchedMessage {
            uid,
            raw: body.to_vec(),
            internal_date: message.internal_date(),
        });
    }

    Ok(fetched)
}

/// Flags `uids` as `\Seen` so later passes skip them.
pub async fn mark_seen(session: &mut ImapSession, uids: &[u32]) -> Result<(), MailSourceError> {
    if uids.is_empty() {
        return Ok(());
    }

    let updates = session.uid_store(uid_set(uids), "+FLAGS (\\Seen)").await?;
    let _: Vec<_> = updates.try_collect().await?;

    info!("-- {} messages marked seen", uids.len());
    Ok(())
}
