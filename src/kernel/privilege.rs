//! Explicit view of the process's ambient privilege.
//!
//! Components never call geteuid() ad hoc; they receive a `PrivilegeContext`
//! so tests can inject an unprivileged identity deterministically.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeContext {
    effective_uid: u32,
    effective_gid: u32,
    simulated: bool,
}

impl PrivilegeContext {
    /// Snapshot of the calling process's effective identity
    pub fn current() -> Self {
        Self {
            effective_uid: nix::unistd::geteuid().as_raw(),
            effective_gid: nix::unistd::getegid().as_raw(),
            simulated: false,
        }
    }

    /// Identity used by tests instead of the real one
    pub fn simulated(effective_uid: u32, effective_gid: u32) -> Self {
        Self {
            effective_uid,
            effective_gid,
            simulated: true,
        }
    }

    pub fn effective_uid(&self) -> u32 {
        self.effective_uid
    }

    pub fn effective_gid(&self) -> u32 {
        self.effective_gid
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    /// Changing a file owner to an arbitrary uid requires root
    pub fn may_change_owner(&self, current_owner: u32, desired_owner: u32) -> bool {
        self.effective_uid == 0 || current_owner == desired_owner
    }

    /// Changing the group to one the caller may not be a member of requires root
    pub fn may_change_group(&self, current_owner: u32, desired_gid: u32) -> bool {
        self.effective_uid == 0
            || (current_owner == self.effective_uid && desired_gid == self.effective_gid)
    }

    pub fn is_root(&self) -> bool {
        self.effective_uid == 0
    }
}
