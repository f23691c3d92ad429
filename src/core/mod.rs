pub mod error;
pub mod types;

pub use error::{PolicyError, Result};
pub use types::{Actor, OperationId, Policy, Role, Rule, RuleType, VersionInfo, VersionMetadata};
