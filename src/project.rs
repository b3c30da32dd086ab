use crate::address::{parse_address_cell, AddressList, EmailAddress};
use crate::diagnostics::Diagnostics;
use crate::error::{CampaignError, Result};
use crate::filter::FilterSet;
use crate::inventory::Inventory;
use crate::message::Attachment;
use std::path::{Path, PathBuf};

pub const FROM_FILE: &str = "from.txt";
pub const SUBJECT_FILE: &str = "subject.txt";
pub const BODY_FILE: &str = "body.html";
pub const APPROVER_FILE: &str = "approver.txt";
pub const TO_FILE: &str = "to.txt";
pub const FILTER_FILE: &str = "filter.txt";
pub const ADDITIONAL_TO_FILE: &str = "additional_to.txt";
pub const CC_FILE: &str = "cc.txt";
pub const BCC_FILE: &str = "bcc.txt";
pub const FIELD_FILE: &str = "field.txt";
pub const FIELD_INVENTORY_FILE: &str = "field-inventory.csv";
pub const ATTACHMENT_DIR: &str = "attachment";

const REQUIRED_FILES: [&str; 4] = [FROM_FILE, SUBJECT_FILE, BODY_FILE, APPROVER_FILE];

/// Campaign project directory: flat files holding the sender, templates and
/// recipient sources.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Open a project, checking that the directory and required files exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CampaignError::MissingProject(root));
        }
        for name in REQUIRED_FILES {
            let path = root.join(name);
            if !path.is_file() {
                return Err(CampaignError::MissingFile(path));
            }
        }
        Ok(Project { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    pub fn read_text(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        std::fs::read_to_string(&path).map_err(|e| CampaignError::io(path, e))
    }

    pub fn sender(&self) -> Result<EmailAddress> {
        let raw = self.read_text(FROM_FILE)?;
        let value = raw
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .unwrap_or_default()
            .to_string();
        EmailAddress::parse(&value).map_err(|_| CampaignError::InvalidSender {
            path: self.path(FROM_FILE),
            value,
        })
    }

    pub fn subject(&self) -> Result<String> {
        Ok(self.read_text(SUBJECT_FILE)?.trim().to_string())
    }

    pub fn body(&self) -> Result<String> {
        self.read_text(BODY_FILE)
    }

    /// Read an address list file. Returns None when the file does not exist.
    pub fn address_list(&self, name: &str, diag: &dyn Diagnostics) -> Result<Option<Vec<EmailAddress>>> {
        if !self.has(name) {
            return Ok(None);
        }
        let content = self.read_text(name)?;
        Ok(Some(parse_address_list(&content, name, diag)))
    }

    pub fn approvers(&self, diag: &dyn Diagnostics) -> Result<Vec<EmailAddress>> {
        Ok(self.address_list(APPROVER_FILE, diag)?.unwrap_or_default())
    }

    pub fn filter(&self) -> Result<Option<FilterSet>> {
        if !self.has(FILTER_FILE) {
            return Ok(None);
        }
        Ok(Some(FilterSet::parse(&self.read_text(FILTER_FILE)?)))
    }

    /// Field names, one per line
    pub fn field_names(&self) -> Result<Vec<String>> {
        if !self.has(FIELD_FILE) {
            return Ok(Vec::new());
        }
        let content = self.read_text(FIELD_FILE)?;
        let mut names: Vec<String> = Vec::new();
        for name in content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
        {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    pub fn field_inventory(&self, diag: &dyn Diagnostics) -> Result<Option<Inventory>> {
        if !self.has(FIELD_INVENTORY_FILE) {
            return Ok(None);
        }
        Inventory::load(self.path(FIELD_INVENTORY_FILE), diag)
    }

    /// Files in `attachment/`, sorted by name
    pub fn attachments(&self) -> Result<Vec<Attachment>> {
        let dir = self.path(ATTACHMENT_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|e| CampaignError::io(&dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        paths.iter().map(|p| Attachment::load(p)).collect()
    }

    /// Write `addresses` to `name` unless it already exists. Returns whether
    /// the file was written.
    pub fn write_list_if_absent(&self, name: &str, addresses: &[EmailAddress]) -> Result<bool> {
        let path = self.path(name);
        if path.exists() {
            return Ok(false);
        }
        let mut content = addresses
            .iter()
            .map(EmailAddress::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        content.push('\n');
        std::fs::write(&path, content).map_err(|e| CampaignError::io(path, e))?;
        Ok(true)
    }
}

/// One entry per line, `#` comments and blanks ignored, `;` separating
/// several addresses on a line. Invalid entries are dropped with a warning.
pub fn parse_address_list(content: &str, origin: &str, diag: &dyn Diagnostics) -> Vec<EmailAddress> {
    let mut list = AddressList::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let location = format!("{origin} line {}", index + 1);
        list.extend(parse_address_cell(line, &location, diag));
    }
    list.into_vec()
}
