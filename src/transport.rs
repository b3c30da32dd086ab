use crate::address::EmailAddress;
use crate::diagnostics::Diagnostics;
use crate::error::{CampaignError, Result};
use crate::message::{render_message, Attachment, OutgoingEmail};
use chrono::Local;
use lettre::{Address, AsyncSendmailTransport, AsyncTransport, Tokio1Executor};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// SMTP envelope for one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: EmailAddress,
    pub recipients: Vec<EmailAddress>,
}

#[allow(async_fn_in_trait)]
pub trait MailTransport {
    async fn submit(&self, envelope: &Envelope, message: &[u8]) -> Result<()>;
}

/// Hands messages to the local MTA's sendmail interface
pub struct SendmailTransport {
    program: PathBuf,
    inner: AsyncSendmailTransport<Tokio1Executor>,
}

impl SendmailTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        SendmailTransport {
            inner: AsyncSendmailTransport::<Tokio1Executor>::new_with_command(program.clone()),
            program,
        }
    }

    fn envelope(envelope: &Envelope) -> Result<lettre::address::Envelope> {
        let parse = |address: &EmailAddress| {
            address
                .as_str()
                .parse::<Address>()
                .map_err(|e| CampaignError::InvalidMessage(format!("{address}: {e}")))
        };
        let recipients = envelope
            .recipients
            .iter()
            .map(parse)
            .collect::<Result<Vec<_>>>()?;
        lettre::address::Envelope::new(Some(parse(&envelope.from)?), recipients)
            .map_err(|e| CampaignError::InvalidMessage(e.to_string()))
    }
}

impl MailTransport for SendmailTransport {
    async fn submit(&self, envelope: &Envelope, message: &[u8]) -> Result<()> {
        let envelope = Self::envelope(envelope)?;
        self.inner
            .send_raw(&envelope, message)
            .await
            .map_err(|e| CampaignError::Transport(format!("{}: {e}", self.program.display())))
    }
}

/// Keeps submissions in memory instead of sending them
#[derive(Debug, Default)]
pub struct RecordingTransport {
    submissions: Mutex<Vec<(Envelope, String)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> Vec<(Envelope, String)> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl MailTransport for RecordingTransport {
    async fn submit(&self, envelope: &Envelope, message: &[u8]) -> Result<()> {
        let mut submissions = self
            .submissions
            .lock()
            .map_err(|e| CampaignError::Transport(e.to_string()))?;
        submissions.push((envelope.clone(), String::from_utf8_lossy(message).to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub emails_sent: usize,
    pub emails_skipped: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
}

/// Splits each email's TO list into batches and submits them with a pause
/// between batches. CC and BCC go out with the first batch only.
pub struct Dispatcher<'a, T: MailTransport> {
    transport: &'a T,
    from: EmailAddress,
    attachments: &'a [Attachment],
    batch_size: usize,
    delay: Duration,
}

impl<'a, T: MailTransport> Dispatcher<'a, T> {
    pub fn new(
        transport: &'a T,
        from: EmailAddress,
        attachments: &'a [Attachment],
        batch_size: usize,
        delay: Duration,
    ) -> Self {
        Dispatcher {
            transport,
            from,
            attachments,
            batch_size: batch_size.max(1),
            delay,
        }
    }

    pub async fn dispatch(&self, emails: &[OutgoingEmail], diag: &dyn Diagnostics) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut first_batch = true;

        for email in emails {
            if email.recipients.to.is_empty() {
                diag.warn(&format!(
                    "Skipping email {}: no recipients",
                    email.sequence_number
                ));
                report.emails_skipped += 1;
                continue;
            }

            let batches: Vec<&[EmailAddress]> = email.recipients.to.chunks(self.batch_size).collect();
            let total = batches.len();
            let mut failed = false;

            for (index, batch) in batches.into_iter().enumerate() {
                if !first_batch && !self.delay.is_zero() {
                    diag.debug(&format!("Waiting {:?} before next batch", self.delay));
                    tokio::time::sleep(self.delay).await;
                }
                first_batch = false;

                let (cc, bcc): (&[EmailAddress], &[EmailAddress]) = if index == 0 {
                    (email.recipients.cc.as_slice(), email.recipients.bcc.as_slice())
                } else {
                    (&[][..], &[][..])
                };

                let envelope = Envelope {
                    from: self.from.clone(),
                    recipients: batch.iter().chain(cc).chain(bcc).cloned().collect(),
                };
                let submitted = match render_message(&self.from, email, batch, cc, self.attachments, Local::now()) {
                    Ok(message) => self.transport.submit(&envelope, &message).await,
                    Err(e) => Err(e),
                };

                match submitted {
                    Ok(()) => {
                        report.batches_sent += 1;
                        diag.info(&format!(
                            "Email {} batch {}/{total} sent to {} recipients",
                            email.sequence_number,
                            index + 1,
                            envelope.recipients.len()
                        ));
                    }
                    Err(e) => {
                        report.batches_failed += 1;
                        failed = true;
                        diag.warn(&format!(
                            "Email {} batch {}/{total} failed: {e}",
                            email.sequence_number,
                            index + 1
                        ));
                    }
                }
            }

            if !failed {
                report.emails_sent += 1;
            }
        }

        report
    }
}
