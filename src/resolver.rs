use crate::address::{merge_recipients, EmailAddress};
use crate::diagnostics::Diagnostics;
use crate::fields::{extract_fields, FieldValueMap};
use crate::filter::CompiledFilter;
use crate::inventory::Inventory;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Which source became the base TO list in single mode. Checked in
/// declaration order: the first available source wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The direct recipient list
    Direct,
    /// Filter file evaluated against the inventory
    Filtered,
    /// The additional list on its own
    Additional,
    /// Nothing available
    Empty,
}

impl SourceKind {
    pub fn select(has_direct: bool, has_filter_and_inventory: bool, has_additional: bool) -> Self {
        if has_direct {
            SourceKind::Direct
        } else if has_filter_and_inventory {
            SourceKind::Filtered
        } else if has_additional {
            SourceKind::Additional
        } else {
            SourceKind::Empty
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Direct => "direct list",
            SourceKind::Filtered => "filter + inventory",
            SourceKind::Additional => "additional list",
            SourceKind::Empty => "none",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientSet {
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
}

impl RecipientSet {
    pub fn to_only(to: Vec<EmailAddress>) -> Self {
        RecipientSet {
            to,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty()
    }

    /// Every envelope recipient: to, then cc, then bcc
    pub fn all(&self) -> impl Iterator<Item = &EmailAddress> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }
}

/// Recipient inputs available to single mode. A source is "available" when
/// it is present and non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipientSources<'a> {
    pub direct: Option<&'a [EmailAddress]>,
    pub filter: Option<&'a CompiledFilter>,
    pub inventory: Option<&'a Inventory>,
    pub additional: Option<&'a [EmailAddress]>,
}

impl RecipientSources<'_> {
    pub fn source_kind(&self) -> SourceKind {
        SourceKind::select(
            self.direct.is_some_and(|d| !d.is_empty()),
            self.filter.is_some() && self.inventory.is_some(),
            self.additional.is_some_and(|a| !a.is_empty()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResolution {
    pub source: SourceKind,
    pub to: Vec<EmailAddress>,
    /// True when the additional list was merged on top of another base
    pub merged_additional: bool,
}

impl SingleResolution {
    /// The merged list is written back to the direct-list file only when that
    /// file did not exist before this run.
    pub fn should_persist(&self, direct_file_existed: bool) -> bool {
        !direct_file_existed && self.source != SourceKind::Direct && !self.to.is_empty()
    }
}

pub fn resolve_single(sources: &RecipientSources<'_>, diag: &dyn Diagnostics) -> SingleResolution {
    let source = sources.source_kind();
    let base: Vec<EmailAddress> = match source {
        SourceKind::Direct => sources.direct.unwrap_or_default().to_vec(),
        SourceKind::Filtered => match (sources.filter, sources.inventory) {
            (Some(filter), Some(inventory)) => inventory.scan(filter, diag).emails.into_vec(),
            _ => Vec::new(),
        },
        SourceKind::Additional => sources.additional.unwrap_or_default().to_vec(),
        SourceKind::Empty => Vec::new(),
    };
    diag.info(&format!(
        "Recipient source: {source} ({} addresses)",
        base.len()
    ));

    let additional = sources.additional.unwrap_or_default();
    let merged_additional = source != SourceKind::Additional && !additional.is_empty();
    let to = if merged_additional {
        let merged = merge_recipients(&base, additional);
        diag.info(&format!(
            "Merged additional list: {} -> {} addresses",
            base.len(),
            merged.len()
        ));
        merged
    } else {
        base
    };

    SingleResolution {
        source,
        to,
        merged_additional,
    }
}

/// One personalized email per filter line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub filter_line: String,
    pub recipients: Vec<EmailAddress>,
    pub field_values: FieldValueMap,
    /// 1-based position among non-comment lines
    pub sequence_number: usize,
    /// Recipient count at resolution time; dry-run never changes it
    pub original_recipient_count: usize,
}

/// Field names to extract per line, and the inventory to read them from
#[derive(Debug, Clone, Copy)]
pub struct FieldRequest<'a> {
    pub names: &'a [String],
    pub inventory: &'a Inventory,
}

#[derive(Debug, Clone, Default)]
pub struct MultiResolution {
    pub configs: Vec<EmailConfig>,
    /// Field names missing from the field inventory, reported once each
    pub missing_fields: Vec<String>,
}

pub fn resolve_multi(
    filter: &CompiledFilter,
    inventory: Option<&Inventory>,
    additional: &[EmailAddress],
    fields: Option<FieldRequest<'_>>,
    diag: &dyn Diagnostics,
) -> MultiResolution {
    let mut resolution = MultiResolution::default();
    let mut missing = BTreeSet::new();

    for (index, line) in filter.lines().iter().enumerate() {
        let sequence_number = index + 1;
        let scanned = match inventory {
            Some(inventory) => inventory.scan(line, diag).emails.into_vec(),
            None => Vec::new(),
        };
        let recipients = merge_recipients(&scanned, additional);
        if scanned.is_empty() {
            diag.warn(&format!(
                "Filter line {sequence_number} '{}' matched no inventory addresses",
                line.text()
            ));
        }

        let field_values = match fields {
            Some(request) => {
                let extraction = extract_fields(line, request.names, request.inventory, diag);
                missing.extend(extraction.missing_fields);
                extraction.values
            }
            None => FieldValueMap::new(),
        };

        diag.info(&format!(
            "Email {sequence_number}: '{}' -> {} recipients",
            line.text(),
            recipients.len()
        ));

        resolution.configs.push(EmailConfig {
            filter_line: line.text().to_string(),
            original_recipient_count: recipients.len(),
            recipients,
            field_values,
            sequence_number,
        });
    }

    resolution.missing_fields = missing.into_iter().collect();
    resolution
}
