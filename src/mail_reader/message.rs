use chrono::{DateTime, FixedOffset, Utc};
use mailparse::{parse_mail, DispositionType, MailHeaderMap, MailParseError, ParsedMail};
use std::path::PathBuf;

/// One processed email. Built once by the mail source, read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub uid: u32,
    pub message_id: Option<String>,
    pub sender: String,
    pub subject: String,
    pub received: DateTime<Utc>,
    pub body: String,
    pub attachments: Vec<AttachmentRef>,
}

/// An attachment that has been written to the attachments directory.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRef {
    pub filename: String,
    pub path: PathBuf,
}

/// Attachment bytes not yet written to disk.
#[derive(Debug)]
pub struct RawAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Headers and content pulled out of a raw RFC 822 message.
#[derive(Debug)]
pub struct ParsedMessage {
    pub uid: u32,
    pub message_id: Option<String>,
    pub sender: String,
    pub subject: String,
    pub received: DateTime<Utc>,
    pub body: String,
    pub attachments: Vec<RawAttachment>,
}

impl ParsedMessage {
    pub fn into_record(self, attachments: Vec<AttachmentRef>) -> MessageRecord {
        MessageRecord {
            uid: self.uid,
            message_id: self.message_id,
            sender: self.sender,
            subject: self.subject,
            received: self.received,
            body: self.body,
            attachments,
        }
    }
}

fn attachment_filename(part: &ParsedMail) -> Option<String> {
    let disposition = part.get_content_disposition();
    let from_disposition = disposition.params.get("filename").cloned();
    let from_content_type = part.ctype.params.get("name").cloned();

    match disposition.disposition {
        DispositionType::Attachment => Some(
            from_disposition
                .or(from_content_type)
                .unwrap_or_else(|| "unnamed_attachment".to_string()),
        ),
        // Some clients mark files inline but still name them
        _ => from_disposition,
    }
}

fn extract_attachments(parsed_mail: &ParsedMail) -> Result<Vec<RawAttachment>, MailParseError> {
    fn process_part(part: &ParsedMail, attachments: &mut Vec<RawAttachment>) -> Result<(), MailParseError> {
        if let Some(filename) = attachment_filename(part) {
            attachments.push(RawAttachment {
                filename,
                content_type: part.ctype.mimetype.clone(),
                content: part.get_body_raw()?,
            });
            return Ok(());
        }

        // Recursively process subparts
        for subpart in &part.subparts {
            process_part(subpart, attachments)?;
        }

        Ok(())
    }

    let mut attachments = Vec::new();
    process_part(parsed_mail, &mut attachments)?;
    Ok(attachments)
}

fn extract_text_content(parsed_mail: &ParsedMail) -> Result<String, MailParseError> {
    fn find_part(part: &ParsedMail, wanted: &dyn Fn(&str) -> bool) -> Result<Option<String>, MailParseError> {
        if part.subparts.is_empty() {
            if attachment_filename(part).is_none() && wanted(&part.ctype.mimetype) {
                return Ok(Some(part.get_body()?));
            }
            return Ok(None);
        }

        for subpart in &part.subparts {
            if let Some(text) = find_part(subpart, wanted)? {
                return Ok(Some(text));
            }
        }

        Ok(None)
    }

    // Prefer plain text, fall back to whatever text part comes first (usually HTML)
    if let Some(text) = find_part(parsed_mail, &|mime: &str| mime == "text/plain")? {
        return Ok(text);
    }
    Ok(find_part(parsed_mail, &|mime: &str| mime.starts_with("text/"))?.unwrap_or_default())
}

fn received_at(date_header: Option<&str>, internal_date: Option<DateTime<FixedOffset>>) -> DateTime<Utc> {
    date_header
        .and_then(|value| mailparse::dateparse(value).ok())
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
        .or_else(|| internal_date.map(|date| date.with_timezone(&Utc)))
        .unwrap_or_else(Utc::now)
}

pub fn parse_message(
    uid: u32,
    raw: &[u8],
    internal_date: Option<DateTime<FixedOffset>>,
) -> Result<ParsedMessage, MailParseError> {
    let parsed_mail = parse_mail(raw)?;

    let sender = parsed_mail.headers.get_first_value("From").unwrap_or_default();
    let subject = parsed_mail.headers.get_first_value("Subject").unwrap_or_default();
    let date = parsed_mail.headers.get_first_value("Date");
    let message_id = parsed_mail
        .headers
        .get_first_value("Message-ID")
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    // Extract text content and attachments
    let body = extract_text_content(&parsed_mail)?;
    let attachments = extract_attachments(&parsed_mail)?;

    Ok(ParsedMessage {
        uid,
        message_id,
        sender,
        subject,
        received: received_at(date.as_deref(), internal_date),
        body,
        attachments,
    })
}
