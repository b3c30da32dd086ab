use std::path::PathBuf;

/// Configuration failures that halt a run before anything is sent.
#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("Required file missing: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Project directory not found: {}", .0.display())]
    MissingProject(PathBuf),
    #[error("No valid recipient source: provide to.txt, filter.txt with an inventory, or additional_to.txt")]
    NoRecipientSource,
    #[error("Dry run needs at least one valid approver in {}", .0.display())]
    NoApprovers(PathBuf),
    #[error("Multi mode requires a filter file: {}", .0.display())]
    MissingFilter(PathBuf),
    #[error("Unknown field name(s) in {source_name}: {}", .fields.join(", "))]
    UnknownFields {
        source_name: String,
        fields: Vec<String>,
    },
    #[error("Inventory {} has no 'email' column", .0.display())]
    MissingEmailColumn(PathBuf),
    #[error("Invalid sender address in {}: {value}", .path.display())]
    InvalidSender { path: PathBuf, value: String },
    #[error("Failed to read inventory {}: {source}", .path.display())]
    Inventory {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot build message: {0}")]
    InvalidMessage(String),
    #[error("Mail submission failed: {0}")]
    Transport(String),
}

impl CampaignError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CampaignError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a single address was rejected. Always logged and skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address longer than {max} characters")]
    TooLong { max: usize },
    #[error("address contains unsafe character '{0}'")]
    UnsafeCharacter(char),
    #[error("malformed address")]
    Malformed,
}

pub type Result<T> = std::result::Result<T, CampaignError>;
