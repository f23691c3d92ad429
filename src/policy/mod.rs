pub mod hash;
pub mod store;
pub mod validate;

pub use hash::policy_hash;
pub use store::PolicyStore;
pub use validate::{check_document, check_policy, validate_policy};
