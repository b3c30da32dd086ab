use crate::dry_run::DEFAULT_DRAFT_MARKER;
use crate::error::{CampaignError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How CC/BCC lists are attached in multi mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CcPolicy {
    /// Every personalized email carries the CC/BCC lists
    EveryEmail,
    /// Only the first email of the run carries them
    FirstEmailOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Global contact inventory (CSV)
    pub inventory_path: PathBuf,
    pub sendmail_path: PathBuf,
    pub batch_size: usize,
    pub batch_delay_seconds: u64,
    pub draft_marker: String,
    pub cc_policy: CcPolicy,
    /// Audit directory, relative to the project directory
    pub output_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            inventory_path: PathBuf::from("inventory.csv"),
            sendmail_path: PathBuf::from("/usr/sbin/sendmail"),
            batch_size: 50,
            batch_delay_seconds: 5,
            draft_marker: DEFAULT_DRAFT_MARKER.to_string(),
            cc_policy: CcPolicy::EveryEmail,
            output_dir: "output".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CampaignError::io(path, e))?;
        let config: AppConfig = serde_yaml::from_str(&content)
            .map_err(|e| CampaignError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| CampaignError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| CampaignError::io(path, e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CampaignError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.output_dir.trim().is_empty() {
            return Err(CampaignError::InvalidConfig(
                "output_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
