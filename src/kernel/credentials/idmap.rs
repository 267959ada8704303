//! uid_map / gid_map / setgroups writers for a freshly unshared user namespace.
//!
//! Fixed sequence: deny setgroups -> write gid_map -> write uid_map.
//! The gid_map writer only accepts a `SetgroupsDenied` token and re-reads the
//! setgroups file before writing, so a reversed order surfaces as
//! `OrderingViolation` instead of a silently escalated group set.

use crate::config::types::{IdentityMapping, PrivboxError, Result};
use crate::kernel::namespace::{io_errno, refused_by_host};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Proof that setgroups was denied through a specific `IdMapFiles`
#[derive(Debug)]
pub struct SetgroupsDenied {
    root: PathBuf,
}

/// The identity-map files of one process (`/proc/self` in production)
#[derive(Clone, Debug)]
pub struct IdMapFiles {
    root: PathBuf,
}

impl IdMapFiles {
    pub fn for_self() -> Self {
        Self::at("/proc/self")
    }

    /// Files rooted somewhere else (tests point this at a temp dir)
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn setgroups_path(&self) -> PathBuf {
        self.root.join("setgroups")
    }

    /// Disable setgroups(2) inside the namespace.
    ///
    /// MUST be called before `write_gid_map`.
    pub fn deny_setgroups(&self) -> Result<SetgroupsDenied> {
        let path = self.setgroups_path();
        write_proc_file(&path, "deny").map_err(|e| match e.kind() {
            ErrorKind::NotFound => PrivboxError::Unsupported {
                facility: format!("{}", path.display()),
                remediation: "kernel predates setgroups control (Linux 3.19); \
                              run the suite on a newer kernel"
                    .to_string(),
            },
            _ => write_error("deny setgroups via", &path, &e),
        })?;

        log::debug!("Denied setgroups via {}", path.display());
        Ok(SetgroupsDenied {
            root: self.root.clone(),
        })
    }

    /// Current setgroups state ("allow" or "deny")
    pub fn setgroups_state(&self) -> Result<String> {
        let path = self.setgroups_path();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            PrivboxError::Namespace(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(content.trim().to_string())
    }

    /// Write the single-entry gid map. Requires setgroups to be denied.
    pub fn write_gid_map(&self, proof: &SetgroupsDenied, mapping: &IdentityMapping) -> Result<()> {
        if proof.root != self.root {
            return Err(PrivboxError::OrderingViolation(format!(
                "setgroups was denied for {} but gid_map is being written for {}",
                proof.root.display(),
                self.root.display()
            )));
        }

        let state = self.setgroups_state()?;
        if state != "deny" {
            return Err(PrivboxError::OrderingViolation(format!(
                "gid_map write attempted while {} reads '{}'",
                self.setgroups_path().display(),
                state
            )));
        }

        let path = self.root.join("gid_map");
        write_proc_file(&path, &mapping.gid_map_line())
            .map_err(|e| self.gid_map_write_error(&path, &e))?;

        log::debug!(
            "Mapped gid {} -> {} via {}",
            mapping.inside_gid,
            mapping.outside_gid,
            path.display()
        );
        Ok(())
    }

    /// Write the single-entry uid map. Runs after the gid map.
    pub fn write_uid_map(&self, mapping: &IdentityMapping) -> Result<()> {
        let path = self.root.join("uid_map");
        write_proc_file(&path, &mapping.uid_map_line())
            .map_err(|e| write_error("write", &path, &e))?;

        log::debug!(
            "Mapped uid {} -> {} via {}",
            mapping.inside_uid,
            mapping.outside_uid,
            path.display()
        );
        Ok(())
    }

    /// A refused gid_map write while setgroups is still allowed is the
    /// kernel enforcing the ordering; any other refusal is the host's policy
    fn gid_map_write_error(&self, path: &Path, err: &std::io::Error) -> PrivboxError {
        if err.kind() == ErrorKind::PermissionDenied
            && self.setgroups_state().map(|s| s != "deny").unwrap_or(false)
        {
            return PrivboxError::OrderingViolation(format!(
                "kernel rejected {} while setgroups is still allowed",
                path.display()
            ));
        }
        write_error("write", path, err)
    }

    /// Full sequence in the order the kernel mandates
    pub fn apply(&self, mapping: &IdentityMapping) -> Result<()> {
        let denied = self.deny_setgroups()?;
        self.write_gid_map(&denied, mapping)?;
        self.write_uid_map(mapping)
    }
}

fn write_error(action: &str, path: &Path, err: &std::io::Error) -> PrivboxError {
    refused_by_host(format!("{} {}", action, path.display()), io_errno(err)).unwrap_or_else(|| {
        PrivboxError::Namespace(format!("Failed to {} {}: {}", action, path.display(), err))
    })
}

/// procfs map files must be written in a single write(2)
fn write_proc_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().write(true).truncate(true).open(path)?;
    file.write_all(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_proc() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["setgroups", "uid_map", "gid_map"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::write(dir.path().join("setgroups"), "allow\n").unwrap();
        dir
    }

    #[test]
    fn apply_writes_in_mandated_order() {
        let dir = fake_proc();
        let files = IdMapFiles::at(dir.path());
        let mapping = IdentityMapping::root_for(1000, 100);

        files.apply(&mapping).unwrap();

        assert_eq!(files.setgroups_state().unwrap(), "deny");
        let gid_map = std::fs::read_to_string(dir.path().join("gid_map")).unwrap();
        let uid_map = std::fs::read_to_string(dir.path().join("uid_map")).unwrap();
        assert_eq!(gid_map, "0 100 1\n");
        assert_eq!(uid_map, "0 1000 1\n");
    }

    #[test]
    fn gid_map_while_setgroups_allowed_is_ordering_violation() {
        let dir = fake_proc();
        let files = IdMapFiles::at(dir.path());
        let mapping = IdentityMapping::root_for(1000, 1000);

        let proof = files.deny_setgroups().unwrap();
        // Something re-enabled setgroups between the two steps
        std::fs::write(dir.path().join("setgroups"), "allow\n").unwrap();

        let err = files.write_gid_map(&proof, &mapping).unwrap_err();
        assert!(matches!(err, PrivboxError::OrderingViolation(_)));
        let gid_map = std::fs::read_to_string(dir.path().join("gid_map")).unwrap();
        assert!(gid_map.is_empty(), "gid_map must not be written");
    }

    #[test]
    fn proof_from_another_process_is_rejected() {
        let a = fake_proc();
        let b = fake_proc();
        let proof = IdMapFiles::at(a.path()).deny_setgroups().unwrap();

        let err = IdMapFiles::at(b.path())
            .write_gid_map(&proof, &IdentityMapping::root_for(1, 1))
            .unwrap_err();
        assert!(matches!(err, PrivboxError::OrderingViolation(_)));
    }

    #[test]
    fn missing_setgroups_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let err = IdMapFiles::at(dir.path()).deny_setgroups().unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn kernel_refusal_while_setgroups_allowed_is_ordering_violation() {
        let dir = fake_proc();
        let files = IdMapFiles::at(dir.path());
        let refused = std::io::Error::from_raw_os_error(libc::EPERM);

        let err = files.gid_map_write_error(&dir.path().join("gid_map"), &refused);
        assert!(matches!(err, PrivboxError::OrderingViolation(_)));
        assert!(!err.is_skip());

        // Same refusal with setgroups denied is the host saying no
        std::fs::write(dir.path().join("setgroups"), "deny").unwrap();
        let err = files.gid_map_write_error(&dir.path().join("gid_map"), &refused);
        assert!(matches!(err, PrivboxError::InsufficientPrivilege { .. }));
        assert!(err.is_skip());
    }

    #[test]
    fn refused_map_writes_are_skips() {
        let path = Path::new("/proc/self/uid_map");
        for errno in [libc::EPERM, libc::EACCES] {
            let err = write_error("write", path, &std::io::Error::from_raw_os_error(errno));
            assert!(matches!(err, PrivboxError::InsufficientPrivilege { .. }));
        }
        let err = write_error("write", path, &std::io::Error::from_raw_os_error(libc::EINVAL));
        assert!(matches!(err, PrivboxError::Namespace(_)));
    }

    #[test]
    fn uid_map_of_an_already_mapped_process_is_refused() {
        // pid 1 has had its map written since boot; the kernel allows one write
        let err = IdMapFiles::at("/proc/1")
            .write_uid_map(&IdentityMapping::root_for(4242, 4242))
            .unwrap_err();
        assert!(err.is_skip(), "unexpected classification: {}", err);
    }

    #[test]
    fn self_files_live_under_proc() {
        assert_eq!(IdMapFiles::for_self().root(), Path::new("/proc/self"));
    }
}
