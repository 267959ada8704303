//! Logical install paths to absolute filesystem paths.
//!
//! Pure and lexical: nothing here touches the filesystem, so a staged tree
//! that does not exist yet resolves the same way as a live one.

use crate::config::types::{PrivboxError, ResolvedPath, Result};
use std::path::{Component, Path, PathBuf};

/// Install prefix plus optional staging root, applied to every logical path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathResolver {
    staging_root: Option<PathBuf>,
    base: PathBuf,
}

impl PathResolver {
    pub fn new(staging_root: Option<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self {
            staging_root,
            base: base.into(),
        }
    }

    pub fn staging_root(&self) -> Option<&Path> {
        self.staging_root.as_deref()
    }

    pub fn resolve(&self, logical_path: &Path) -> Result<ResolvedPath> {
        resolve(logical_path, self.staging_root.as_deref(), &self.base)
    }
}

/// Resolve `logical_path` against the install prefix and staging root.
///
/// * absolute + staging root: `staging_root/<path without leading />`
/// * absolute, no staging root: the path unchanged
/// * relative: joined onto `base`, then staged like an absolute path
///
/// `..` components are folded lexically; one that would climb above the
/// staging root (or above `base` for relative input) is `InvalidPath`.
pub fn resolve(logical_path: &Path, staging_root: Option<&Path>, base: &Path) -> Result<ResolvedPath> {
    if logical_path.as_os_str().is_empty() {
        return Err(PrivboxError::invalid_path(logical_path, "empty path"));
    }

    let absolute = if logical_path.is_absolute() {
        if staging_root.is_none() {
            return Ok(ResolvedPath::new_unchecked(logical_path.to_path_buf()));
        }
        normalize(logical_path, Path::new("/"), logical_path)?
    } else {
        if !base.is_absolute() {
            return Err(PrivboxError::invalid_path(
                base,
                "install prefix must be absolute",
            ));
        }
        let base = normalize(base, Path::new("/"), base)?;
        normalize(&base.join(logical_path), &base, logical_path)?
    };

    match staging_root {
        None => Ok(ResolvedPath::new_unchecked(absolute)),
        Some(root) => {
            if !root.is_absolute() {
                return Err(PrivboxError::invalid_path(root, "staging root must be absolute"));
            }
            let root = normalize(root, Path::new("/"), root)?;
            let relative = absolute.strip_prefix("/").unwrap_or(&absolute);
            let staged = root.join(relative);
            if !staged.starts_with(&root) {
                return Err(PrivboxError::invalid_path(
                    logical_path,
                    format!("escapes staging root {}", root.display()),
                ));
            }
            Ok(ResolvedPath::new_unchecked(staged))
        }
    }
}

/// Fold `.` and `..` in an absolute path, refusing to climb above `floor`
fn normalize(path: &Path, floor: &Path, original: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Prefix(_) => {
                return Err(PrivboxError::invalid_path(original, "platform path prefix"));
            }
            Component::ParentDir => {
                if out == floor || !out.pop() {
                    return Err(PrivboxError::invalid_path(
                        original,
                        format!("'..' climbs above {}", floor.display()),
                    ));
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    if !out.starts_with(floor) {
        return Err(PrivboxError::invalid_path(
            original,
            format!("resolves outside {}", floor.display()),
        ));
    }
    Ok(out)
}
