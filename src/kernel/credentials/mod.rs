//! Account lookups and user-namespace identity maps.
//!
//! CRITICAL: setgroups MUST be denied BEFORE gid_map is written.

pub mod identity;
pub mod idmap;

pub use identity::{resolve_account, resolve_account_optional};
pub use idmap::{IdMapFiles, SetgroupsDenied};
