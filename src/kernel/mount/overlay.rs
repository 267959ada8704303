/// Bind overlays that shadow a system path with fixture content
use crate::config::types::{PrivboxError, Result};
use crate::kernel::namespace::refused_by_host;
use crate::safety::cleanup::Release;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::errno::Errno;
use std::path::PathBuf;

/// Requested overlay: `source` is bound over `target`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlaySpec {
    pub source: PathBuf,
    pub target: PathBuf,
}

impl OverlaySpec {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Both ends must be existing directories; nothing is created on the host
    pub fn validate(&self) -> Result<()> {
        if !self.source.is_dir() {
            return Err(PrivboxError::Mount(format!(
                "Overlay source {} is not a directory",
                self.source.display()
            )));
        }
        if !self.target.is_absolute() || !self.target.is_dir() {
            return Err(PrivboxError::Mount(format!(
                "Overlay target {} must be an existing absolute directory",
                self.target.display()
            )));
        }
        Ok(())
    }
}

/// Active bind mount, unmounted exactly once
#[derive(Debug)]
pub struct OverlayMount {
    source: PathBuf,
    target: PathBuf,
    mounted: bool,
}

impl OverlayMount {
    /// mount --bind source target (recursive)
    pub fn bind(spec: &OverlaySpec) -> Result<Self> {
        spec.validate()?;

        mount(
            Some(spec.source.as_path()),
            spec.target.as_path(),
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )
        .map_err(|e| classify_bind_error(spec, e))?;

        log::info!(
            "Overlaid {} with {}",
            spec.target.display(),
            spec.source.display()
        );

        Ok(Self {
            source: spec.source.clone(),
            target: spec.target.clone(),
            mounted: true,
        })
    }

    /// Lazy unmount; a second call is a no-op
    pub fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }

        match umount2(self.target.as_path(), MntFlags::MNT_DETACH) {
            Ok(()) => {}
            // Already gone (namespace reclaimed or unmounted elsewhere)
            Err(Errno::EINVAL) | Err(Errno::ENOENT) => {
                log::debug!("{} was no longer mounted", self.target.display());
            }
            Err(e) => {
                return Err(PrivboxError::Mount(format!(
                    "Failed to unmount overlay {}: {}",
                    self.target.display(),
                    e
                )))
            }
        }

        self.mounted = false;
        log::info!("Removed overlay from {}", self.target.display());
        Ok(())
    }
}

fn classify_bind_error(spec: &OverlaySpec, errno: Errno) -> PrivboxError {
    let operation = format!(
        "bind mount {} over {}",
        spec.source.display(),
        spec.target.display()
    );
    refused_by_host(operation.as_str(), errno)
        .unwrap_or_else(|| PrivboxError::Mount(format!("Failed to {}: {}", operation, errno)))
}

impl Release for OverlayMount {
    fn describe(&self) -> String {
        format!("overlay {} -> {}", self.source.display(), self.target.display())
    }

    fn release(&mut self) -> Result<()> {
        self.unmount()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_source() {
        let spec = OverlaySpec::new("/nonexistent/privbox/etc", "/etc");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_target() {
        let dir = tempfile::tempdir().unwrap();
        let spec = OverlaySpec::new(dir.path(), "etc");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_accepts_existing_directories() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        assert!(OverlaySpec::new(src.path(), dst.path()).validate().is_ok());
    }

    #[test]
    fn unmounted_overlay_release_is_noop() {
        let mut overlay = OverlayMount {
            source: PathBuf::from("/src"),
            target: PathBuf::from("/dst"),
            mounted: false,
        };
        assert!(overlay.release().is_ok());
        assert!(!overlay.mounted);
        assert!(overlay.describe().contains("/src"));
    }

    #[test]
    fn refused_bind_is_a_skip() {
        let spec = OverlaySpec::new("/fixture/etc", "/etc");
        let err = classify_bind_error(&spec, Errno::EPERM);
        assert!(matches!(err, PrivboxError::InsufficientPrivilege { .. }));
        assert!(err.to_string().contains("/fixture/etc"));

        let err = classify_bind_error(&spec, Errno::ENOTDIR);
        assert!(matches!(err, PrivboxError::Mount(_)));
        assert!(!err.is_skip());
    }
}
