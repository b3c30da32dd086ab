use crate::address::EmailAddress;
use crate::fields::escape_html;
use crate::message::OutgoingEmail;
use crate::resolver::{EmailConfig, RecipientSet};

pub const DEFAULT_DRAFT_MARKER: &str = "[DRAFT] ";

/// Marks an already injected banner
const BANNER_TAG: &str = "<!-- draft-info -->";

/// Swaps real recipients for the approver list so a campaign can be reviewed
/// before it goes out. Original counts are carried along untouched.
#[derive(Debug, Clone)]
pub struct DryRunAdapter {
    approvers: Vec<EmailAddress>,
    marker: String,
}

impl DryRunAdapter {
    pub fn new(approvers: Vec<EmailAddress>, marker: impl Into<String>) -> Self {
        DryRunAdapter {
            approvers,
            marker: marker.into(),
        }
    }

    pub fn approvers(&self) -> &[EmailAddress] {
        &self.approvers
    }

    /// Approvers only; CC and BCC are suppressed
    pub fn recipients(&self, _resolved: &RecipientSet) -> RecipientSet {
        RecipientSet::to_only(self.approvers.clone())
    }

    pub fn apply_configs(&self, configs: Vec<EmailConfig>) -> Vec<EmailConfig> {
        configs
            .into_iter()
            .map(|config| EmailConfig {
                recipients: self.approvers.clone(),
                ..config
            })
            .collect()
    }

    pub fn prefix_subject(&self, subject: &str) -> String {
        let marker = self.marker.trim();
        if marker.is_empty() || subject.starts_with(marker) {
            subject.to_string()
        } else {
            format!("{}{subject}", self.marker)
        }
    }

    /// Dry-run version of `email`. Applying it twice gives the same result.
    pub fn apply(&self, email: OutgoingEmail) -> OutgoingEmail {
        let body = inject_banner(&email.body, &draft_banner(&email));
        OutgoingEmail {
            recipients: self.recipients(&email.recipients),
            subject: self.prefix_subject(&email.subject),
            body,
            dry_run: true,
            ..email
        }
    }
}

/// HTML note telling approvers who the email would really go to
pub fn draft_banner(email: &OutgoingEmail) -> String {
    let mut banner = String::new();
    banner.push_str(BANNER_TAG);
    banner.push_str(
        "<div style=\"border:2px dashed #c00;padding:8px;margin-bottom:12px;font-family:sans-serif\">",
    );
    banner.push_str("<strong>DRAFT - for approval only</strong><br>");
    if let Some(line) = &email.filter_line {
        banner.push_str(&format!(
            "Email {} filter: <code>{}</code><br>",
            email.sequence_number,
            escape_html(line)
        ));
    }
    banner.push_str(&format!(
        "Original recipients: {} to, {} cc, {} bcc",
        email.original.to, email.original.cc, email.original.bcc
    ));
    banner.push_str("</div>");
    banner
}

fn inject_banner(body: &str, banner: &str) -> String {
    if body.contains(BANNER_TAG) {
        return body.to_string();
    }
    // ASCII lowering keeps byte offsets aligned with `body`
    let lower = body.to_ascii_lowercase();
    if let Some(start) = lower.find("<body") {
        if let Some(offset) = lower[start..].find('>') {
            let split = start + offset + 1;
            return format!("{}{banner}{}", &body[..split], &body[split..]);
        }
    }
    format!("{banner}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValueMap;
    use crate::message::OriginalCounts;

    fn addr(s: &str) -> EmailAddress {
        EmailAddress::parse(s).unwrap()
    }

    fn adapter() -> DryRunAdapter {
        DryRunAdapter::new(vec![addr("approver@example.com")], DEFAULT_DRAFT_MARKER)
    }

    fn email() -> OutgoingEmail {
        let recipients = RecipientSet {
            to: vec![addr("a@example.com"), addr("b@example.com")],
            cc: vec![addr("cc@example.com")],
            bcc: vec![],
        };
        OutgoingEmail {
            sequence_number: 1,
            filter_line: Some("department=\"sales\"".to_string()),
            original: OriginalCounts::of(&recipients),
            recipients,
            subject: "Launch plan".to_string(),
            body: "<html><BODY class=\"x\"><p>Hi</p></BODY></html>".to_string(),
            dry_run: false,
        }
    }

    #[test]
    fn test_apply_substitutes_approvers_and_keeps_counts() {
        let drafted = adapter().apply(email());
        assert_eq!(drafted.recipients.to, vec![addr("approver@example.com")]);
        assert!(drafted.recipients.cc.is_empty());
        assert!(drafted.recipients.bcc.is_empty());
        assert_eq!(
            drafted.original,
            OriginalCounts {
                to: 2,
                cc: 1,
                bcc: 0
            }
        );
        assert_eq!(drafted.subject, "[DRAFT] Launch plan");
        assert!(drafted.dry_run);
        assert!(drafted
            .body
            .starts_with("<html><BODY class=\"x\"><!-- draft-info -->"));
        assert!(drafted.body.contains("department=&quot;sales&quot;"));
        assert!(drafted.body.contains("Original recipients: 2 to, 1 cc, 0 bcc"));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let dry = adapter();
        let once = dry.apply(email());
        let twice = dry.apply(once.clone());
        assert_eq!(once, twice);
        assert_eq!(twice.subject.matches("[DRAFT]").count(), 1);
    }

    #[test]
    fn test_banner_without_body_tag() {
        let mut plain = email();
        plain.body = "<p>Hi</p>".to_string();
        plain.filter_line = None;
        let drafted = adapter().apply(plain);
        assert!(drafted.body.starts_with("<!-- draft-info -->"));
        assert!(drafted.body.ends_with("<p>Hi</p>"));
        assert!(!drafted.body.contains("filter:"));
    }

    #[test]
    fn test_apply_configs_keeps_original_count() {
        let config = EmailConfig {
            filter_line: "region=eu".to_string(),
            recipients: vec![addr("a@example.com"), addr("b@example.com"), addr("c@example.com")],
            field_values: FieldValueMap::new(),
            sequence_number: 1,
            original_recipient_count: 3,
        };
        let dry = adapter();
        let drafted = dry.apply_configs(vec![config]);
        assert_eq!(drafted[0].recipients, vec![addr("approver@example.com")]);
        assert_eq!(drafted[0].original_recipient_count, 3);
        assert_eq!(dry.apply_configs(drafted.clone()), drafted);
    }

    #[test]
    fn test_prefix_subject_respects_existing_marker() {
        let dry = adapter();
        assert_eq!(dry.prefix_subject("[DRAFT] Already"), "[DRAFT] Already");
        let bare = DryRunAdapter::new(vec![], "");
        assert_eq!(bare.prefix_subject("Subject"), "Subject");
    }
}
