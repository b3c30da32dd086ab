use crate::address::EmailAddress;
use crate::error::{CampaignError, Result};
use crate::resolver::RecipientSet;
use chrono::{DateTime, Local};
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use serde::Serialize;
use std::path::Path;
use std::time::SystemTime;

/// Recipient counts before any dry-run substitution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OriginalCounts {
    pub to: usize,
    pub cc: usize,
    pub bcc: usize,
}

impl OriginalCounts {
    pub fn of(recipients: &RecipientSet) -> Self {
        OriginalCounts {
            to: recipients.to.len(),
            cc: recipients.cc.len(),
            bcc: recipients.bcc.len(),
        }
    }
}

/// A fully resolved email, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub sequence_number: usize,
    /// Set in multi mode
    pub filter_line: Option<String>,
    pub recipients: RecipientSet,
    pub subject: String,
    pub body: String,
    pub original: OriginalCounts,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| CampaignError::io(path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Attachment {
            content_type: mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .to_string(),
            filename,
            data,
        })
    }

    fn to_part(&self) -> Result<SinglePart> {
        let content_type = ContentType::parse(&self.content_type).map_err(|e| {
            CampaignError::InvalidMessage(format!("{}: {e}", self.filename))
        })?;
        Ok(MimeAttachment::new(self.filename.clone()).body(self.data.clone(), content_type))
    }
}

fn mailbox(address: &EmailAddress) -> Result<Mailbox> {
    address
        .as_str()
        .parse()
        .map_err(|e| CampaignError::InvalidMessage(format!("{address}: {e}")))
}

/// Render one submission of `email`. `to` and `cc` are the header recipients
/// for this batch; BCC recipients only travel in the envelope.
pub fn render_message(
    from: &EmailAddress,
    email: &OutgoingEmail,
    to: &[EmailAddress],
    cc: &[EmailAddress],
    attachments: &[Attachment],
    date: DateTime<Local>,
) -> Result<Vec<u8>> {
    let mut builder = Message::builder()
        .from(mailbox(from)?)
        .subject(email.subject.clone())
        .date(SystemTime::from(date));
    for address in to {
        builder = builder.to(mailbox(address)?);
    }
    for address in cc {
        builder = builder.cc(mailbox(address)?);
    }

    let mut parts = MultiPart::mixed().singlepart(SinglePart::html(email.body.clone()));
    for attachment in attachments {
        parts = parts.singlepart(attachment.to_part()?);
    }

    let message = builder.multipart(parts).map_err(|e| {
        CampaignError::InvalidMessage(format!("email {}: {e}", email.sequence_number))
    })?;
    Ok(message.formatted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn addr(s: &str) -> EmailAddress {
        EmailAddress::parse(s).unwrap()
    }

    fn sample_email() -> OutgoingEmail {
        let recipients = RecipientSet {
            to: vec![addr("a@example.com"), addr("b@example.com")],
            cc: vec![addr("cc@example.com")],
            bcc: vec![addr("hidden@example.com")],
        };
        OutgoingEmail {
            sequence_number: 2,
            filter_line: None,
            original: OriginalCounts::of(&recipients),
            recipients,
            subject: "Quarterly update".to_string(),
            body: "<html><body><p>Hello</p></body></html>".to_string(),
            dry_run: false,
        }
    }

    #[test]
    fn test_render_message_headers_and_parts() {
        let email = sample_email();
        let date = Local.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let attachment = Attachment {
            filename: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            data: b"hello attachment".to_vec(),
        };
        let rendered = render_message(
            &addr("sender@example.com"),
            &email,
            &email.recipients.to,
            &email.recipients.cc,
            &[attachment],
            date,
        )
        .unwrap();
        let rendered = String::from_utf8(rendered).unwrap();

        assert!(rendered.contains("From: sender@example.com\r\n"));
        assert!(rendered.contains("a@example.com, b@example.com"));
        assert!(rendered.contains("Cc: cc@example.com\r\n"));
        assert!(rendered.contains("Subject: Quarterly update\r\n"));
        assert!(rendered.contains("multipart/mixed"));
        assert!(rendered.contains("<p>Hello</p>"));
        assert!(rendered.contains("notes.txt"));
        assert!(rendered.contains("hello attachment"));
        assert!(!rendered.contains("hidden@example.com"));
    }

    #[test]
    fn test_render_message_encodes_non_ascii_subject() {
        let mut email = sample_email();
        email.subject = "Grüße aus dem Team".to_string();
        let rendered = render_message(
            &addr("sender@example.com"),
            &email,
            &email.recipients.to,
            &[],
            &[],
            Local::now(),
        )
        .unwrap();
        let rendered = String::from_utf8(rendered).unwrap();
        assert!(rendered.contains("=?utf-8?") || rendered.contains("=?UTF-8?"));
        assert!(!rendered.contains("Grüße"));
        assert!(!rendered.contains("Cc:"));
    }

    #[test]
    fn test_attachment_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        std::fs::write(&path, "a,b\n").unwrap();
        let attachment = Attachment::load(&path).unwrap();
        assert_eq!(attachment.filename, "summary.csv");
        assert_eq!(attachment.content_type, "text/csv");

        let path = dir.path().join("blob");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();
        assert_eq!(
            Attachment::load(&path).unwrap().content_type,
            "application/octet-stream"
        );
        assert_eq!(attachment.data, b"a,b\n");
    }
}
