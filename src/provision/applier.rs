//! Ownership and mode invariants for installed artifacts and rule directories.
//!
//! Each rule produces exactly one `PrivilegeOutcome`. Nothing here aborts on
//! a rule that cannot be fully applied; the outcome carries the remediation.

use crate::config::types::{
    ArtifactSpec, DegradeReason, DirectorySpec, PrivilegeOutcome, ProvisionSpec, ResolvedPath,
    Result, SkipReason, MODE_MASK,
};
use crate::kernel::privilege::PrivilegeContext;
use crate::provision::paths::PathResolver;
use crate::provision::report::{EntryKind, ProvisionReport};
use nix::sys::stat::Mode;
use nix::unistd::{chown, Gid, Uid};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// The umask is process-wide; guards hold this so concurrent appliers never
/// restore each other's cleared value
static UMASK_LOCK: Mutex<()> = Mutex::new(());

/// Clears the umask for its lifetime so mkdir lands on the exact mode
struct UmaskGuard {
    previous: Mode,
    _lock: MutexGuard<'static, ()>,
}

impl UmaskGuard {
    fn clear() -> Self {
        let lock = UMASK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            previous: nix::sys::stat::umask(Mode::empty()),
            _lock: lock,
        }
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        nix::sys::stat::umask(self.previous);
    }
}

pub struct PrivilegeApplier {
    context: PrivilegeContext,
    /// Service account that could not be resolved, if any
    missing_account: Option<String>,
}

impl PrivilegeApplier {
    pub fn new(context: PrivilegeContext) -> Self {
        Self {
            context,
            missing_account: None,
        }
    }

    /// Directories created without an owner report this account as missing
    pub fn with_missing_account(mut self, account: impl Into<String>) -> Self {
        self.missing_account = Some(account.into());
        self
    }

    /// Resolve every spec, then apply directories before artifacts.
    ///
    /// Path resolution happens up front: an invalid path fails the whole run
    /// before anything on disk changes.
    pub fn apply(&self, specs: &[ProvisionSpec], resolver: &PathResolver) -> Result<ProvisionReport> {
        let mut resolved = specs
            .iter()
            .map(|spec| -> Result<_> { Ok((resolver.resolve(spec.logical_path())?, spec)) })
            .collect::<Result<Vec<_>>>()?;
        // Stable: relative order within each kind is kept
        resolved.sort_by_key(|(_, spec)| !spec.is_directory());

        let mut report = ProvisionReport::new();
        for (path, spec) in resolved {
            let (kind, outcome) = match spec {
                ProvisionSpec::Directory(d) => (EntryKind::Directory, self.apply_directory(&path, d)),
                ProvisionSpec::Artifact(a) => (EntryKind::Artifact, self.apply_artifact(&path, a)),
            };
            match &outcome {
                PrivilegeOutcome::Degraded { reason, .. } => {
                    log::warn!("Degraded {}: {}", path, reason)
                }
                other => log::info!("{}: {:?}", path, other),
            }
            report.push(path, kind, outcome);
        }
        Ok(report)
    }

    /// Create the directory if absent with its final mode; never touch an existing one
    pub fn apply_directory(&self, path: &ResolvedPath, spec: &DirectorySpec) -> PrivilegeOutcome {
        let target = path.as_path();
        let mode = spec.mode & MODE_MASK;

        match fs::symlink_metadata(target) {
            Ok(meta) if meta.is_dir() => {
                let current = meta.mode() & MODE_MASK;
                if current & !mode != 0 {
                    log::warn!(
                        "{} exists with mode {:o}, broader than rule {:o}; left untouched",
                        path,
                        current,
                        mode
                    );
                }
                return PrivilegeOutcome::skipped(SkipReason::AlreadyExists);
            }
            Ok(_) => {
                return PrivilegeOutcome::degraded(
                    DegradeReason::PathConflict,
                    format!(
                        "{} exists but is not a directory; remove it and re-run to create it with mode {:o}",
                        path, mode
                    ),
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return io_outcome(&e, format!("inspect {}", path)),
        }

        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return io_outcome(&e, format!("mkdir -p {}", parent.display()));
            }
        }

        let created = {
            let _umask = UmaskGuard::clear();
            fs::DirBuilder::new().mode(mode).create(target)
        };
        match created {
            Ok(()) => log::info!("Created {} with mode {:o}", path, mode),
            // Lost a race with another installer; the existing one wins
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return PrivilegeOutcome::skipped(SkipReason::AlreadyExists);
            }
            Err(e) => return io_outcome(&e, format!("mkdir -m {:o} {}", mode, path)),
        }

        if spec.owner_uid.is_none() && spec.owner_gid.is_none() {
            if let Some(account) = &self.missing_account {
                return PrivilegeOutcome::degraded(
                    DegradeReason::IdentityNotFound,
                    format!(
                        "create the '{}' account, then as root run: chown {} {}",
                        account, account, path
                    ),
                );
            }
            return PrivilegeOutcome::Applied;
        }

        match self.apply_owner(target, spec.owner_uid, spec.owner_gid) {
            Some(degraded) => degraded,
            None => PrivilegeOutcome::Applied,
        }
    }

    /// Owner first, then mode: chown clears setuid/setgid bits on Linux
    pub fn apply_artifact(&self, path: &ResolvedPath, spec: &ArtifactSpec) -> PrivilegeOutcome {
        let target = path.as_path();
        let mode = spec.desired_mode & MODE_MASK;
        let owner = owner_text(Some(spec.desired_owner_uid), spec.desired_group_gid);

        let meta = match fs::metadata(target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return PrivilegeOutcome::degraded(
                    DegradeReason::ArtifactMissing,
                    format!(
                        "install {} first, then as root run: chown {} {} && chmod {:o} {}",
                        path, owner, path, mode, path
                    ),
                );
            }
            Err(e) => return io_outcome(&e, format!("inspect {}", path)),
        };

        if !meta.is_file() {
            return PrivilegeOutcome::degraded(
                DegradeReason::PathConflict,
                format!("{} is not a regular file; reinstall the helper binary", path),
            );
        }

        let owner_ok = meta.uid() == spec.desired_owner_uid;
        let group_ok = spec.desired_group_gid.map_or(true, |g| meta.gid() == g);
        if owner_ok && group_ok && meta.mode() & MODE_MASK == mode {
            return PrivilegeOutcome::skipped(SkipReason::AlreadyCorrect);
        }

        let mut degraded = None;
        if !owner_ok || !group_ok {
            degraded = self.apply_owner(
                target,
                (!owner_ok).then_some(spec.desired_owner_uid),
                if group_ok { None } else { spec.desired_group_gid },
            );
        }

        // Re-read: a successful chown may have cleared the setuid bit
        let current = match fs::metadata(target) {
            Ok(meta) => meta.mode() & MODE_MASK,
            Err(e) => return io_outcome(&e, format!("inspect {}", path)),
        };
        if current != mode {
            if let Err(e) = fs::set_permissions(target, fs::Permissions::from_mode(mode)) {
                return io_outcome(&e, format!("chmod {:o} {}", mode, path));
            }
            log::info!("Set mode {:o} on {}", mode, path);
        }

        degraded.unwrap_or(PrivilegeOutcome::Applied)
    }

    /// Change owner/group when needed. Returns a degraded outcome when the
    /// change could not be made.
    fn apply_owner(&self, target: &Path, uid: Option<u32>, gid: Option<u32>) -> Option<PrivilegeOutcome> {
        let meta = match fs::symlink_metadata(target) {
            Ok(meta) => meta,
            Err(e) => return Some(io_outcome(&e, format!("inspect {}", target.display()))),
        };

        let uid = uid.filter(|u| *u != meta.uid());
        let gid = gid.filter(|g| *g != meta.gid());
        if uid.is_none() && gid.is_none() {
            return None;
        }

        let remediation = format!(
            "as root run: chown {} {}",
            owner_text(uid.or(Some(meta.uid())), gid),
            target.display()
        );

        // Checked explicitly for every owner change, independent of any mode change
        let allowed = uid.map_or(true, |u| self.context.may_change_owner(meta.uid(), u))
            && gid.map_or(true, |g| self.context.may_change_group(meta.uid(), g));
        if !allowed {
            return Some(PrivilegeOutcome::degraded(
                DegradeReason::InsufficientPrivilege,
                remediation,
            ));
        }

        match chown(target, uid.map(Uid::from_raw), gid.map(Gid::from_raw)) {
            Ok(()) => {
                log::info!("Changed owner of {} to {:?}:{:?}", target.display(), uid, gid);
                None
            }
            Err(nix::errno::Errno::EPERM) => Some(PrivilegeOutcome::degraded(
                DegradeReason::InsufficientPrivilege,
                remediation,
            )),
            Err(e) => Some(PrivilegeOutcome::degraded(
                DegradeReason::Io,
                format!("chown failed ({}); {}", e, remediation),
            )),
        }
    }
}

fn owner_text(uid: Option<u32>, gid: Option<u32>) -> String {
    let user = match uid {
        Some(0) => "root".to_string(),
        Some(u) => u.to_string(),
        None => String::new(),
    };
    match gid {
        Some(g) => format!("{}:{}", user, g),
        None => user,
    }
}

fn io_outcome(err: &std::io::Error, action: String) -> PrivilegeOutcome {
    match err.kind() {
        ErrorKind::PermissionDenied => PrivilegeOutcome::degraded(
            DegradeReason::InsufficientPrivilege,
            format!("as root run: {}", action),
        ),
        _ => PrivilegeOutcome::degraded(
            DegradeReason::Io,
            format!("{} failed: {}", action, err),
        ),
    }
}
