use crate::error::{CampaignError, Result};
use crate::message::{OriginalCounts, OutgoingEmail};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

pub const SUMMARY_TEXT: &str = "summary.txt";
pub const SUMMARY_JSON: &str = "summary.json";

#[derive(Debug, Clone, Serialize)]
pub struct EmailSummary {
    pub sequence_number: usize,
    pub filter_line: Option<String>,
    pub recipient_file: String,
    pub original: OriginalCounts,
    pub actual_to: usize,
    pub actual_cc: usize,
    pub actual_bcc: usize,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: String,
    pub dry_run: bool,
    pub timestamp: String,
    pub emails: Vec<EmailSummary>,
}

pub fn recipient_file_name(sequence_number: usize) -> String {
    format!("recipients_{sequence_number:03}.txt")
}

/// Write one recipient file per email plus `summary.txt` and `summary.json`
/// into `dir`, creating it if needed.
pub fn write_audit(
    dir: &Path,
    mode: &str,
    emails: &[OutgoingEmail],
    timestamp: DateTime<Local>,
) -> Result<RunSummary> {
    std::fs::create_dir_all(dir).map_err(|e| CampaignError::io(dir, e))?;
    let stamp = timestamp.format("%Y-%m-%d %H:%M:%S %z").to_string();
    let dry_run = emails.iter().any(|e| e.dry_run);

    let mut summaries = Vec::with_capacity(emails.len());
    for email in emails {
        let file_name = recipient_file_name(email.sequence_number);
        let mut content = String::new();
        let _ = writeln!(content, "# Email: {}", email.sequence_number);
        let _ = writeln!(
            content,
            "# Filter: {}",
            email.filter_line.as_deref().unwrap_or("(none)")
        );
        let _ = writeln!(content, "# Generated: {stamp}");
        let _ = writeln!(content, "# Recipients: {}", email.original.to);
        if email.dry_run {
            let _ = writeln!(
                content,
                "# Dry run: delivered to {} approver(s) instead",
                email.recipients.to.len()
            );
        }
        for address in &email.recipients.to {
            let _ = writeln!(content, "{address}");
        }
        write_file(&dir.join(&file_name), &content)?;

        summaries.push(EmailSummary {
            sequence_number: email.sequence_number,
            filter_line: email.filter_line.clone(),
            recipient_file: file_name,
            original: email.original,
            actual_to: email.recipients.to.len(),
            actual_cc: email.recipients.cc.len(),
            actual_bcc: email.recipients.bcc.len(),
            subject: email.subject.clone(),
        });
    }

    let summary = RunSummary {
        mode: mode.to_string(),
        dry_run,
        timestamp: stamp,
        emails: summaries,
    };

    write_file(&dir.join(SUMMARY_TEXT), &render_summary(&summary))?;
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| CampaignError::InvalidConfig(format!("summary serialization: {e}")))?;
    write_file(&dir.join(SUMMARY_JSON), &json)?;

    Ok(summary)
}

pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Campaign run: {}", summary.timestamp);
    let _ = writeln!(out, "Mode: {}", summary.mode);
    let _ = writeln!(out, "Dry run: {}", if summary.dry_run { "yes" } else { "no" });
    let _ = writeln!(out, "Emails: {}", summary.emails.len());
    let _ = writeln!(out);
    for email in &summary.emails {
        let _ = writeln!(
            out,
            "{:>3}. {} recipients (cc {}, bcc {}) -> {}",
            email.sequence_number,
            email.original.to,
            email.original.cc,
            email.original.bcc,
            email.recipient_file
        );
        if let Some(line) = &email.filter_line {
            let _ = writeln!(out, "     filter: {line}");
        }
        let _ = writeln!(out, "     subject: {}", email.subject);
    }
    out
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| CampaignError::io(path, e))
}
