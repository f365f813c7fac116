use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::MailSourceError;
use crate::mail_reader::message::{AttachmentRef, RawAttachment};

// Keep only characters that are safe in a file name on every platform
fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let sanitized: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let sanitized = sanitized.trim_start_matches('.').to_string();
    if sanitized.is_empty() {
        "attachment".to_string()
    } else {
        sanitized
    }
}

/// `<uid>_<index>_<name>`, or `<uid>_<index>_<n>_<name>` for the `n`th retry
/// after a collision.
pub fn attachment_path(dir: &Path, uid: u32, index: usize, attempt: u32, filename: &str) -> PathBuf {
    let name = sanitize_filename(filename);
    match attempt {
        0 => dir.join(format!("{}_{}_{}", uid, index, name)),
        n => dir.join(format!("{}_{}_{}_{}", uid, index, n, name)),
    }
}

// UIDs repeat after a UIDVALIDITY reset or a mailbox change, so never reuse a path
async fn create_unique(
    dir: &Path,
    uid: u32,
    index: usize,
    filename: &str,
) -> Result<(PathBuf, File), MailSourceError> {
    let mut attempt = 0;
    loop {
        let path = attachment_path(dir, uid, index, attempt, filename);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!("{} already exists, trying another name", path.display());
                attempt += 1;
            }
            Err(source) => return Err(MailSourceError::Attachment { path, source }),
        }
    }
}

async fn write_all(file: &mut File, content: &[u8]) -> io::Result<()> {
    file.write_all(content).await?;
    file.flush().await
}

pub async fn save_attachments(
    dir: &Path,
    uid: u32,
    attachments: &[RawAttachment],
) -> Result<Vec<AttachmentRef>, MailSourceError> {
    if attachments.is_empty() {
        return Ok(Vec::new());
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| MailSourceError::Attachment {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut saved = Vec::with_capacity(attachments.len());
    for (index, attachment) in attachments.iter().enumerate() {
        let (path, mut file) = create_unique(dir, uid, index, &attachment.filename).await?;
        write_all(&mut file, &attachment.content)
            .await
            .map_err(|source| MailSourceError::Attachment {
                path: path.clone(),
                source,
            })?;
        debug!(
            "-- saved {} ({}, {} bytes) to {}",
            attachment.filename,
            attachment.content_type,
            attachment.content.len(),
            path.display()
        );
        saved.push(AttachmentRef {
            filename: attachment.filename.clone(),
            path,
        });
    }

    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_directories_and_unsafe_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\report 2025.pdf"), "report_2025.pdf");
        assert_eq!(sanitize_filename("résumé.docx"), "r_sum_.docx");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "attachment");
        assert_eq!(sanitize_filename("..."), "attachment");
    }

    #[test]
    fn path_is_unique_per_message_and_index() {
        let dir = Path::new("/data/attachments");
        let first = attachment_path(dir, 42, 0, 0, "scan.pdf");
        let second = attachment_path(dir, 42, 1, 0, "scan.pdf");
        let other = attachment_path(dir, 43, 0, 0, "scan.pdf");
        assert_eq!(first, PathBuf::from("/data/attachments/42_0_scan.pdf"));
        assert_eq!(
            attachment_path(dir, 42, 0, 2, "scan.pdf"),
            PathBuf::from("/data/attachments/42_0_2_scan.pdf")
        );
        assert_ne!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn reused_uid_never_overwrites_an_earlier_file() {
        let tmp = tempfile::tempdir().unwrap();
        let attachment = |content: &[u8]| RawAttachment {
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            content: content.to_vec(),
        };

        let first = save_attachments(tmp.path(), 7, &[attachment(b"FIRST")]).await.unwrap();
        let second = save_attachments(tmp.path(), 7, &[attachment(b"SECOND")]).await.unwrap();

        assert_ne!(first[0].path, second[0].path);
        assert_eq!(second[0].path, tmp.path().join("7_0_1_report.pdf"));
        assert_eq!(std::fs::read(&first[0].path).unwrap(), b"FIRST");
        assert_eq!(std::fs::read(&second[0].path).unwrap(), b"SECOND");
    }

    #[tokio::test]
    async fn writes_attachments_under_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("attachments");
        let attachments = vec![
            RawAttachment {
                filename: "a.txt".to_string(),
                content_type: "text/plain".to_string(),
                content: b"first".to_vec(),
            },
            RawAttachment {
                filename: "a.txt".to_string(),
                content_type: "text/plain".to_string(),
                content: b"second".to_vec(),
            },
        ];

        let saved = save_attachments(&dir, 5, &attachments).await.unwrap();

        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].filename, "a.txt");
        assert_eq!(std::fs::read(&saved[0].path).unwrap(), b"first");
        assert_eq!(std::fs::read(&saved[1].path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn no_attachments_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("never-created");
        let saved = save_attachments(&dir, 1, &[]).await.unwrap();
        assert!(saved.is_empty());
        assert!(!dir.exists());
    }
}
