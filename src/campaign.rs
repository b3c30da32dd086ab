use crate::address::EmailAddress;
use crate::audit::{write_audit, RunSummary};
use crate::config::{AppConfig, CcPolicy};
use crate::diagnostics::Diagnostics;
use crate::dry_run::DryRunAdapter;
use crate::error::{CampaignError, Result};
use crate::fields::{field_source, MICROSERVICE_TABLE_ROWS};
use crate::filter::FilterSet;
use crate::inventory::Inventory;
use crate::message::{OriginalCounts, OutgoingEmail};
use crate::project::{
    Project, ADDITIONAL_TO_FILE, APPROVER_FILE, BCC_FILE, CC_FILE, FIELD_FILE, FILTER_FILE,
    TO_FILE,
};
use crate::resolver::{
    resolve_multi, resolve_single, FieldRequest, RecipientSet, RecipientSources, SourceKind,
};
use crate::template::{placeholders, substitute};
use crate::transport::{DispatchReport, Dispatcher, MailTransport};
use chrono::Local;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One email to the merged recipient set
    Single,
    /// One personalized email per filter line
    Multi,
}

impl FromStr for Mode {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Mode::Single),
            "multi" => Ok(Mode::Multi),
            other => Err(CampaignError::InvalidConfig(format!(
                "unknown mode '{other}', expected single or multi"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Single => f.write_str("single"),
            Mode::Multi => f.write_str("multi"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignPlan {
    pub mode: Mode,
    pub dry_run: bool,
    pub from: EmailAddress,
    pub emails: Vec<OutgoingEmail>,
    /// Single mode only
    pub source: Option<SourceKind>,
    /// Whether the merged list was written to a new direct-list file
    pub persisted_direct_list: bool,
}

/// Ties the project files, inventories and resolution steps into a list of
/// ready-to-send emails.
pub struct Campaign<'a> {
    project: Project,
    config: AppConfig,
    diag: &'a dyn Diagnostics,
}

impl<'a> Campaign<'a> {
    pub fn new(project: Project, config: AppConfig, diag: &'a dyn Diagnostics) -> Self {
        Campaign {
            project,
            config,
            diag,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn plan(&self, mode: Mode, dry_run: bool) -> Result<CampaignPlan> {
        let from = self.project.sender()?;
        let mut plan = match mode {
            Mode::Single => self.plan_single(from)?,
            Mode::Multi => self.plan_multi(from)?,
        };

        let has_recipients = plan.emails.iter().any(|e| !e.recipients.to.is_empty());
        if !has_recipients && !dry_run {
            match mode {
                Mode::Single => return Err(CampaignError::NoRecipientSource),
                Mode::Multi => self
                    .diag
                    .warn("No filter line matched any recipient; nothing will be sent"),
            }
        }

        if dry_run {
            let approvers = self.project.approvers(self.diag)?;
            if approvers.is_empty() {
                return Err(CampaignError::NoApprovers(self.project.path(APPROVER_FILE)));
            }
            let adapter = DryRunAdapter::new(approvers, self.config.draft_marker.clone());
            for email in &plan.emails {
                self.diag.info(&format!(
                    "Dry run: email {} would reach {} to, {} cc, {} bcc; sending to {} approver(s)",
                    email.sequence_number,
                    email.original.to,
                    email.original.cc,
                    email.original.bcc,
                    adapter.approvers().len()
                ));
            }
            plan.emails = plan.emails.into_iter().map(|e| adapter.apply(e)).collect();
            plan.dry_run = true;
        }

        Ok(plan)
    }

    fn load_global_inventory(&self) -> Result<Option<Inventory>> {
        Inventory::load(&self.config.inventory_path, self.diag)
    }

    fn check_filter_fields(&self, filter: &FilterSet, inventory: &Inventory) -> Result<()> {
        let referenced = filter.referenced_fields();
        let unknown = inventory.unknown_columns(referenced.iter().map(String::as_str));
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(CampaignError::UnknownFields {
                source_name: FILTER_FILE.to_string(),
                fields: unknown,
            })
        }
    }

    fn list(&self, name: &str) -> Result<Vec<EmailAddress>> {
        Ok(self.project.address_list(name, self.diag)?.unwrap_or_default())
    }

    fn plan_single(&self, from: EmailAddress) -> Result<CampaignPlan> {
        let direct_file_existed = self.project.has(TO_FILE);
        let direct = self.project.address_list(TO_FILE, self.diag)?;
        let additional = self.project.address_list(ADDITIONAL_TO_FILE, self.diag)?;
        let filter = self.project.filter()?;

        let inventory = match &filter {
            Some(filter) => {
                let inventory = self.load_global_inventory()?;
                if let Some(inventory) = &inventory {
                    self.check_filter_fields(filter, inventory)?;
                }
                inventory
            }
            None => None,
        };
        let compiled = filter.as_ref().map(|f| f.compile(self.diag));

        let resolution = resolve_single(
            &RecipientSources {
                direct: direct.as_deref(),
                filter: compiled.as_ref(),
                inventory: inventory.as_ref(),
                additional: additional.as_deref(),
            },
            self.diag,
        );

        let mut persisted_direct_list = false;
        if resolution.should_persist(direct_file_existed) {
            persisted_direct_list = self.project.write_list_if_absent(TO_FILE, &resolution.to)?;
            if persisted_direct_list {
                self.diag.info(&format!(
                    "Saved {} resolved recipients to {}",
                    resolution.to.len(),
                    self.project.path(TO_FILE).display()
                ));
            }
        }

        let recipients = RecipientSet {
            to: resolution.to,
            cc: self.list(CC_FILE)?,
            bcc: self.list(BCC_FILE)?,
        };
        let email = OutgoingEmail {
            sequence_number: 1,
            filter_line: None,
            original: OriginalCounts::of(&recipients),
            recipients,
            subject: self.project.subject()?,
            body: self.project.body()?,
            dry_run: false,
        };

        Ok(CampaignPlan {
            mode: Mode::Single,
            dry_run: false,
            from,
            emails: vec![email],
            source: Some(resolution.source),
            persisted_direct_list,
        })
    }

    fn plan_multi(&self, from: EmailAddress) -> Result<CampaignPlan> {
        let filter = self
            .project
            .filter()?
            .ok_or_else(|| CampaignError::MissingFilter(self.project.path(FILTER_FILE)))?;
        if filter.is_empty() {
            self.diag.warn("Filter file has no active lines; nothing to send");
        }

        let inventory = self.load_global_inventory()?;
        match &inventory {
            Some(inventory) => self.check_filter_fields(&filter, inventory)?,
            None => self
                .diag
                .warn("No inventory available; emails will only reach the additional list"),
        }

        let field_names = self.project.field_names()?;
        let local_inventory = if field_names.is_empty() {
            None
        } else {
            self.project.field_inventory(self.diag)?
        };
        let field_inventory = field_source(local_inventory.as_ref(), inventory.as_ref());

        let fields = match field_inventory {
            Some(source) if !field_names.is_empty() => {
                let unknown = source.unknown_columns(
                    field_names
                        .iter()
                        .map(String::as_str)
                        .filter(|n| *n != MICROSERVICE_TABLE_ROWS),
                );
                if !unknown.is_empty() {
                    return Err(CampaignError::UnknownFields {
                        source_name: FIELD_FILE.to_string(),
                        fields: unknown,
                    });
                }
                Some(FieldRequest {
                    names: &field_names,
                    inventory: source,
                })
            }
            None if !field_names.is_empty() => {
                self.diag
                    .warn("Field names given but no inventory to extract them from");
                None
            }
            _ => None,
        };

        let subject_template = self.project.subject()?;
        let body_template = self.project.body()?;
        if fields.is_some() {
            for name in placeholders(&format!("{subject_template}\n{body_template}")) {
                if name != MICROSERVICE_TABLE_ROWS && !field_names.contains(&name) {
                    self.diag
                        .warn(&format!("Placeholder {{{name}}} is not in {FIELD_FILE} and stays as is"));
                }
            }
        }

        let additional = self.list(ADDITIONAL_TO_FILE)?;
        let cc = self.list(CC_FILE)?;
        let bcc = self.list(BCC_FILE)?;
        let compiled = filter.compile(self.diag);
        let resolution = resolve_multi(&compiled, inventory.as_ref(), &additional, fields, self.diag);

        if self.config.cc_policy == CcPolicy::EveryEmail
            && resolution.configs.len() > 1
            && !(cc.is_empty() && bcc.is_empty())
        {
            self.diag.info(&format!(
                "CC/BCC recipients will receive {} copies, one per filter line",
                resolution.configs.len()
            ));
        }

        let emails = resolution
            .configs
            .into_iter()
            .map(|config| {
                let carries_copies = match self.config.cc_policy {
                    CcPolicy::EveryEmail => true,
                    CcPolicy::FirstEmailOnly => config.sequence_number == 1,
                };
                let recipients = RecipientSet {
                    to: config.recipients,
                    cc: if carries_copies { cc.clone() } else { Vec::new() },
                    bcc: if carries_copies { bcc.clone() } else { Vec::new() },
                };
                OutgoingEmail {
                    sequence_number: config.sequence_number,
                    filter_line: Some(config.filter_line),
                    original: OriginalCounts {
                        to: config.original_recipient_count,
                        cc: recipients.cc.len(),
                        bcc: recipients.bcc.len(),
                    },
                    recipients,
                    subject: substitute(&subject_template, &config.field_values),
                    body: substitute(&body_template, &config.field_values),
                    dry_run: false,
                }
            })
            .collect();

        Ok(CampaignPlan {
            mode: Mode::Multi,
            dry_run: false,
            from,
            emails,
            source: None,
            persisted_direct_list: false,
        })
    }

    pub fn write_audit(&self, plan: &CampaignPlan) -> Result<RunSummary> {
        let dir = self.project.path(&self.config.output_dir);
        let summary = write_audit(&dir, &plan.mode.to_string(), &plan.emails, Local::now())?;
        self.diag
            .info(&format!("Audit files written to {}", dir.display()));
        Ok(summary)
    }

    pub async fn send<T: MailTransport>(&self, plan: &CampaignPlan, transport: &T) -> Result<DispatchReport> {
        let attachments = self.project.attachments()?;
        let dispatcher = Dispatcher::new(
            transport,
            plan.from.clone(),
            &attachments,
            self.config.batch_size,
            Duration::from_secs(self.config.batch_delay_seconds),
        );
        Ok(dispatcher.dispatch(&plan.emails, self.diag).await)
    }
}
