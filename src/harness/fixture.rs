//! Fixture directory holding the replacement account database.

use crate::config::types::{PrivboxError, Result};
use std::path::{Path, PathBuf};

/// Fixture root exported to the target
pub const TEST_DATA_ENV: &str = "POLKIT_TEST_DATA";
pub const MOCK_PASSWD_ENV: &str = "MOCK_PASSWD";
pub const MOCK_GROUP_ENV: &str = "MOCK_GROUP";
pub const MOCK_NETGROUP_ENV: &str = "MOCK_NETGROUP";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixtureLayout {
    data_dir: PathBuf,
    passwd: PathBuf,
    group: PathBuf,
    netgroup: Option<PathBuf>,
}

impl FixtureLayout {
    /// Canonicalize `data_dir` and check the account files it must contain
    pub fn load(data_dir: &Path) -> Result<Self> {
        let data_dir = data_dir.canonicalize().map_err(|e| {
            PrivboxError::Fixture(format!("data directory {}: {}", data_dir.display(), e))
        })?;
        let etc = data_dir.join("etc");
        if !etc.is_dir() {
            return Err(PrivboxError::Fixture(format!(
                "{} has no etc/ directory to overlay onto /etc",
                data_dir.display()
            )));
        }

        let required = |name: &str| -> Result<PathBuf> {
            let path = etc.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(PrivboxError::Fixture(format!(
                    "missing fixture file {}",
                    path.display()
                )))
            }
        };
        let passwd = required("passwd")?;
        let group = required("group")?;
        let netgroup = Some(etc.join("netgroup")).filter(|p| p.is_file());

        log::debug!(
            "Loaded fixture {} (netgroup: {})",
            data_dir.display(),
            netgroup.is_some()
        );
        Ok(Self {
            data_dir,
            passwd,
            group,
            netgroup,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory bound over /etc
    pub fn etc_dir(&self) -> PathBuf {
        self.data_dir.join("etc")
    }

    /// Variables exported to the target
    pub fn env(&self) -> Vec<(&'static str, PathBuf)> {
        let mut vars = vec![
            (TEST_DATA_ENV, self.data_dir.clone()),
            (MOCK_PASSWD_ENV, self.passwd.clone()),
            (MOCK_GROUP_ENV, self.group.clone()),
        ];
        if let Some(netgroup) = &self.netgroup {
            vars.push((MOCK_NETGROUP_ENV, netgroup.clone()));
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture(with_netgroup: bool) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let etc = dir.path().join("etc");
        fs::create_dir(&etc).unwrap();
        fs::write(etc.join("passwd"), "testuser:x:5000:5000::/home/testuser:/bin/sh\n").unwrap();
        fs::write(etc.join("group"), "testuser:x:5000:\n").unwrap();
        if with_netgroup {
            fs::write(etc.join("netgroup"), "foo (host,testuser,)\n").unwrap();
        }
        dir
    }

    #[test]
    fn env_points_at_fixture_files() {
        let dir = fixture(true);
        let layout = FixtureLayout::load(dir.path()).unwrap();
        let env = layout.env();
        let canonical = dir.path().canonicalize().unwrap();

        assert!(env.contains(&(TEST_DATA_ENV, canonical.clone())));
        assert!(env.contains(&(MOCK_PASSWD_ENV, canonical.join("etc/passwd"))));
        assert!(env.contains(&(MOCK_NETGROUP_ENV, canonical.join("etc/netgroup"))));
        assert_eq!(layout.etc_dir(), canonical.join("etc"));
    }

    #[test]
    fn netgroup_is_optional() {
        let dir = fixture(false);
        let layout = FixtureLayout::load(dir.path()).unwrap();
        assert!(layout.env().iter().all(|(k, _)| *k != MOCK_NETGROUP_ENV));
    }

    #[test]
    fn missing_group_file_is_a_fixture_error() {
        let dir = fixture(false);
        fs::remove_file(dir.path().join("etc/group")).unwrap();
        let err = FixtureLayout::load(dir.path()).unwrap_err();
        assert!(matches!(err, PrivboxError::Fixture(_)));
        assert!(err.to_string().contains("group"));
    }

    #[test]
    fn nonexistent_data_dir_is_a_fixture_error() {
        let err = FixtureLayout::load(Path::new("/nonexistent/privbox/data")).unwrap_err();
        assert!(matches!(err, PrivboxError::Fixture(_)));
    }
}
