// ============================================================================
// Policy Versioning
// ============================================================================
//
// Monotonic version counter, bounded history and the lock that serializes
// version transitions.
//
// ============================================================================

pub mod lock;
pub mod registry;

pub use lock::{LockGuard, LockInfo, VersionLock};
pub use registry::VersionRegistry;
