pub mod address;
pub mod audit;
pub mod campaign;
pub mod condition;
pub mod config;
pub mod diagnostics;
pub mod dry_run;
pub mod error;
pub mod fields;
pub mod filter;
pub mod inventory;
pub mod message;
pub mod pattern;
pub mod project;
pub mod resolver;
pub mod template;
pub mod transport;

pub use address::{merge_recipients, EmailAddress};
pub use campaign::{Campaign, CampaignPlan, Mode};
pub use config::{AppConfig, CcPolicy};
pub use diagnostics::{CollectingDiagnostics, Diagnostics, LogDiagnostics};
pub use dry_run::DryRunAdapter;
pub use error::{AddressError, CampaignError};
pub use filter::{row_matches, FilterSet};
pub use inventory::{Inventory, InventoryRow};
pub use pattern::{matches, Operator};
pub use resolver::{EmailConfig, RecipientSet, SourceKind};
