/// Core types shared by the provisioner and the sandbox harness
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Permission bits a rule may carry (rwx for all classes plus setuid/setgid/sticky)
pub const MODE_MASK: u32 = 0o7777;

/// Setuid bit
pub const S_ISUID: u32 = 0o4000;

/// Installed executable whose mode/ownership must satisfy a privilege invariant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Install-relative or absolute path before staging
    pub logical_path: PathBuf,
    /// Permission bits including setuid/setgid
    pub desired_mode: u32,
    /// Owner the artifact must end up with
    pub desired_owner_uid: u32,
    /// Group the artifact must end up with (None leaves the group alone)
    pub desired_group_gid: Option<u32>,
}

impl ArtifactSpec {
    /// Build an artifact rule.
    ///
    /// A setuid rule must be owned by root: a setuid binary owned by anybody
    /// else does not grant the privilege the helper needs.
    pub fn new(
        logical_path: impl Into<PathBuf>,
        desired_mode: u32,
        desired_owner_uid: u32,
        desired_group_gid: Option<u32>,
    ) -> Result<Self> {
        let logical_path = logical_path.into();
        if desired_mode & !MODE_MASK != 0 {
            return Err(PrivboxError::Config(format!(
                "Mode {:o} for {} carries bits outside {:o}",
                desired_mode,
                logical_path.display(),
                MODE_MASK
            )));
        }
        if desired_mode & S_ISUID != 0 && desired_owner_uid != 0 {
            return Err(PrivboxError::Config(format!(
                "Setuid artifact {} must be owned by root, rule asks for uid {}",
                logical_path.display(),
                desired_owner_uid
            )));
        }
        Ok(Self {
            logical_path,
            desired_mode,
            desired_owner_uid,
            desired_group_gid,
        })
    }
}

/// Restricted directory created only when absent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySpec {
    pub logical_path: PathBuf,
    /// Mode applied at creation time
    pub mode: u32,
    pub owner_uid: Option<u32>,
    pub owner_gid: Option<u32>,
}

impl DirectorySpec {
    pub fn new(logical_path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            logical_path: logical_path.into(),
            mode,
            owner_uid: None,
            owner_gid: None,
        }
    }

    pub fn owned_by(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        self.owner_uid = uid;
        self.owner_gid = gid;
        self
    }
}

/// A provisioning rule: either an artifact or a directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvisionSpec {
    Directory(DirectorySpec),
    Artifact(ArtifactSpec),
}

impl ProvisionSpec {
    pub fn logical_path(&self) -> &Path {
        match self {
            ProvisionSpec::Directory(d) => &d.logical_path,
            ProvisionSpec::Artifact(a) => &a.logical_path,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, ProvisionSpec::Directory(_))
    }
}

impl From<ArtifactSpec> for ProvisionSpec {
    fn from(spec: ArtifactSpec) -> Self {
        ProvisionSpec::Artifact(spec)
    }
}

impl From<DirectorySpec> for ProvisionSpec {
    fn from(spec: DirectorySpec) -> Self {
        ProvisionSpec::Directory(spec)
    }
}

/// Absolute filesystem path after staging; owns nothing
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// Callers guarantee `path` is absolute and normalized
    pub(crate) fn new_unchecked(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Why a rule needed no change
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Directory was already present and left untouched
    AlreadyExists,
    /// Artifact already had the requested mode and owner
    AlreadyCorrect,
}

/// Why a rule could only be applied partially
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    InsufficientPrivilege,
    IdentityNotFound,
    ArtifactMissing,
    /// Something other than the expected file type occupies the path
    PathConflict,
    Io,
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::InsufficientPrivilege => write!(f, "insufficient privilege"),
            DegradeReason::IdentityNotFound => write!(f, "identity not found"),
            DegradeReason::ArtifactMissing => write!(f, "artifact missing"),
            DegradeReason::PathConflict => write!(f, "path conflict"),
            DegradeReason::Io => write!(f, "I/O error"),
        }
    }
}

/// Result of applying one rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PrivilegeOutcome {
    Applied,
    Skipped { reason: SkipReason },
    Degraded { reason: DegradeReason, remediation: String },
}

impl PrivilegeOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        PrivilegeOutcome::Skipped { reason }
    }

    pub fn degraded(reason: DegradeReason, remediation: impl Into<String>) -> Self {
        PrivilegeOutcome::Degraded {
            reason,
            remediation: remediation.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, PrivilegeOutcome::Degraded { .. })
    }
}

/// Resolved local account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Single-entry uid/gid range mapping for a user namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub inside_uid: u32,
    pub outside_uid: u32,
    pub inside_gid: u32,
    pub outside_gid: u32,
}

impl IdentityMapping {
    /// Present the outside identity as root inside the namespace
    pub fn root_for(outside_uid: u32, outside_gid: u32) -> Self {
        Self {
            inside_uid: 0,
            outside_uid,
            inside_gid: 0,
            outside_gid,
        }
    }

    /// Line written to /proc/<pid>/uid_map
    pub fn uid_map_line(&self) -> String {
        format!("{} {} 1\n", self.inside_uid, self.outside_uid)
    }

    /// Line written to /proc/<pid>/gid_map
    pub fn gid_map_line(&self) -> String {
        format!("{} {} 1\n", self.inside_gid, self.outside_gid)
    }
}

/// Custom error types for privbox
#[derive(Error, Debug)]
pub enum PrivboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Insufficient privilege for {operation}: {remediation}")]
    InsufficientPrivilege {
        operation: String,
        remediation: String,
    },

    #[error("Unsupported: {facility} is not available: {remediation}")]
    Unsupported {
        facility: String,
        remediation: String,
    },

    #[error("Account '{0}' not found in the local account database")]
    IdentityNotFound(String),

    #[error("Identity mapping ordering violation: {0}")]
    OrderingViolation(String),

    #[error("Namespace isolation error: {0}")]
    Namespace(String),

    #[error("Mount error: {0}")]
    Mount(String),

    #[error("Message bus error: {0}")]
    Bus(String),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PrivboxError {
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PrivboxError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Environment cannot run the check; callers report skip, not failure
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            PrivboxError::InsufficientPrivilege { .. } | PrivboxError::Unsupported { .. }
        )
    }
}

impl From<nix::errno::Errno> for PrivboxError {
    fn from(err: nix::errno::Errno) -> Self {
        PrivboxError::Process(err.to_string())
    }
}

/// Result type alias for privbox operations
pub type Result<T> = std::result::Result<T, PrivboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setuid_rule_requires_root_owner() {
        assert!(ArtifactSpec::new("/usr/bin/pkexec", 0o4755, 0, None).is_ok());
        let err = ArtifactSpec::new("/usr/bin/pkexec", 0o4755, 1000, None).unwrap_err();
        assert!(err.to_string().contains("must be owned by root"));
    }

    #[test]
    fn artifact_rejects_file_type_bits() {
        assert!(ArtifactSpec::new("/usr/bin/x", 0o100755, 0, None).is_err());
    }

    #[test]
    fn mapping_lines_are_single_entry() {
        let map = IdentityMapping::root_for(1000, 1001);
        assert_eq!(map.uid_map_line(), "0 1000 1\n");
        assert_eq!(map.gid_map_line(), "0 1001 1\n");
    }

    #[test]
    fn skip_classification() {
        let unsupported = PrivboxError::Unsupported {
            facility: "user namespaces".into(),
            remediation: "use a newer kernel".into(),
        };
        assert!(unsupported.is_skip());
        assert!(!PrivboxError::OrderingViolation("gid_map first".into()).is_skip());
        assert!(!PrivboxError::invalid_path("/x", "escapes").is_skip());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let outcome = PrivilegeOutcome::degraded(DegradeReason::IdentityNotFound, "create it");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "degraded");
        assert_eq!(json["reason"], "identity_not_found");
    }
}
