//! Fixed provisioning rules for the authorization service install tree.

use crate::config::types::{ArtifactSpec, DirectorySpec, Identity, ProvisionSpec, Result};
use std::path::PathBuf;

/// Privileged launcher in the executable directory
pub const LAUNCHER_NAME: &str = "pkexec";

/// Authentication helper in the library directory.
/// Setuid root: it authenticates not only the invoking user but possibly
/// root and other users as well.
pub const AGENT_HELPER_NAME: &str = "polkit-agent-helper-1";

/// Rule directory name under sysconfdir and datadir
pub const RULES_DIR_NAME: &str = "rules.d";

/// Rule directories hold authorization logic only the service may read
pub const RULES_DIR_MODE: u32 = 0o700;

/// Both helpers are setuid root, no group or world write
pub const HELPER_MODE: u32 = 0o4755;

/// Install directories the rules are expressed against
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionLayout {
    pub bindir: PathBuf,
    pub datadir: PathBuf,
    pub libdir: PathBuf,
    pub sysconfdir: PathBuf,
}

impl ProvisionLayout {
    /// Specs in application order: directories first, then artifacts.
    ///
    /// `service` is the resolved service account; without it the rule
    /// directories carry no owner and ownership becomes advisory.
    pub fn specs(&self, service: Option<&Identity>) -> Result<Vec<ProvisionSpec>> {
        let owner_uid = service.map(|s| s.uid);

        Ok(vec![
            DirectorySpec::new(self.sysconfdir.join(RULES_DIR_NAME), RULES_DIR_MODE)
                .owned_by(owner_uid, None)
                .into(),
            DirectorySpec::new(self.datadir.join(RULES_DIR_NAME), RULES_DIR_MODE)
                .owned_by(owner_uid, None)
                .into(),
            ArtifactSpec::new(self.bindir.join(LAUNCHER_NAME), HELPER_MODE, 0, None)?.into(),
            ArtifactSpec::new(self.libdir.join(AGENT_HELPER_NAME), HELPER_MODE, 0, None)?.into(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::S_ISUID;

    fn layout() -> ProvisionLayout {
        ProvisionLayout {
            bindir: "bin".into(),
            datadir: "share/polkit-1".into(),
            libdir: "lib/polkit-1".into(),
            sysconfdir: "/etc/polkit-1".into(),
        }
    }

    #[test]
    fn directories_come_before_artifacts() {
        let specs = layout().specs(None).unwrap();
        let first_artifact = specs.iter().position(|s| !s.is_directory()).unwrap();
        assert!(specs[first_artifact..].iter().all(|s| !s.is_directory()));
        assert_eq!(first_artifact, 2);
    }

    #[test]
    fn helpers_are_setuid_root() {
        for spec in layout().specs(None).unwrap() {
            if let ProvisionSpec::Artifact(a) = spec {
                assert_ne!(a.desired_mode & S_ISUID, 0);
                assert_eq!(a.desired_owner_uid, 0);
            }
        }
    }

    #[test]
    fn rule_directories_are_owned_by_service_account() {
        let service = Identity {
            name: "polkitd".into(),
            uid: 998,
            gid: 996,
        };
        for spec in layout().specs(Some(&service)).unwrap() {
            if let ProvisionSpec::Directory(d) = spec {
                assert_eq!(d.mode, 0o700);
                assert_eq!(d.owner_uid, Some(998));
                assert!(d.logical_path.ends_with("rules.d"));
            }
        }
    }

    #[test]
    fn missing_service_account_leaves_owner_unset() {
        for spec in layout().specs(None).unwrap() {
            if let ProvisionSpec::Directory(d) = spec {
                assert_eq!(d.owner_uid, None);
            }
        }
    }
}
