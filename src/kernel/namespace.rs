/// User + mount namespace creation for the test sandbox
use crate::config::types::{PrivboxError, Result};

use nix::errno::Errno;
use nix::sched::{unshare, CloneFlags};

/// Namespace flags the sandbox always requests together
pub const SANDBOX_CLONE_FLAGS: CloneFlags = CloneFlags::CLONE_NEWUSER.union(CloneFlags::CLONE_NEWNS);

/// Check if the kernel exposes user and mount namespaces at all
pub fn is_supported() -> bool {
    std::path::Path::new("/proc/self/ns/user").exists()
        && std::path::Path::new("/proc/self/ns/mnt").exists()
}

/// Check if host sysctls allow unprivileged user namespaces.
///
/// Returns None when no known knob is present (the kernel decides at unshare time).
pub fn unprivileged_userns_allowed() -> Option<bool> {
    // Debian/Ubuntu
    if let Ok(content) = std::fs::read_to_string("/proc/sys/kernel/unprivileged_userns_clone") {
        if content.trim() == "0" {
            return Some(false);
        }
    }

    // Ubuntu 23.10+ AppArmor restriction
    if let Ok(content) =
        std::fs::read_to_string("/proc/sys/kernel/apparmor_restrict_unprivileged_userns")
    {
        if content.trim() == "1" {
            return Some(false);
        }
    }

    // RHEL/CentOS
    if let Ok(content) = std::fs::read_to_string("/proc/sys/user/max_user_namespaces") {
        if let Ok(max) = content.trim().parse::<u64>() {
            return Some(max > 0);
        }
    }

    None
}

/// Remediation text for a refused unshare
pub fn userns_remediation() -> String {
    "allow unprivileged user namespaces (sysctl kernel.unprivileged_userns_clone=1, \
     user.max_user_namespaces>0, or kernel.apparmor_restrict_unprivileged_userns=0) \
     or run the suite where namespace creation is permitted"
        .to_string()
}

/// Map an unshare(2) failure onto the skip taxonomy
pub fn classify_unshare_error(errno: Errno) -> PrivboxError {
    match errno {
        Errno::EPERM | Errno::EACCES | Errno::ENOSPC | Errno::EUSERS => {
            PrivboxError::InsufficientPrivilege {
                operation: format!("unshare(CLONE_NEWUSER|CLONE_NEWNS): {}", errno),
                remediation: userns_remediation(),
            }
        }
        Errno::EINVAL | Errno::ENOSYS => PrivboxError::Unsupported {
            facility: format!("user+mount namespaces (unshare: {})", errno),
            remediation: "use a Linux kernel built with CONFIG_USER_NS and run the harness \
                          from a single-threaded process"
                .to_string(),
        },
        other => PrivboxError::Namespace(format!(
            "Failed to unshare user+mount namespaces: {}",
            other
        )),
    }
}

/// Permission refusals after unshare (LSM policy, locked mounts, procfs
/// ownership) are host limitations and classify as skips
pub fn refused_by_host(operation: impl Into<String>, errno: Errno) -> Option<PrivboxError> {
    match errno {
        Errno::EPERM | Errno::EACCES => Some(PrivboxError::InsufficientPrivilege {
            operation: format!("{}: {}", operation.into(), errno),
            remediation: userns_remediation(),
        }),
        _ => None,
    }
}

/// errno behind an I/O error from a procfs write
pub fn io_errno(err: &std::io::Error) -> Errno {
    err.raw_os_error().map_or(Errno::UnknownErrno, Errno::from_raw)
}

/// Move the calling process into new user and mount namespaces.
///
/// Must be called while the process is single-threaded.
pub fn enter_user_and_mount_namespaces() -> Result<()> {
    if !cfg!(target_os = "linux") || !is_supported() {
        return Err(PrivboxError::Unsupported {
            facility: "user+mount namespaces (/proc/self/ns/user)".to_string(),
            remediation: "run the suite on Linux with namespace support".to_string(),
        });
    }

    if unprivileged_userns_allowed() == Some(false) && !nix::unistd::geteuid().is_root() {
        log::warn!("Host sysctls report unprivileged user namespaces as disabled");
    }

    unshare(SANDBOX_CLONE_FLAGS).map_err(classify_unshare_error)?;

    log::info!("Entered new user and mount namespaces");
    Ok(())
}

/// mount(NULL, "/", NULL, MS_REC | MS_PRIVATE, NULL)
///
/// Keeps sandbox overlays from propagating back to the host
pub fn harden_mount_propagation() -> Result<()> {
    use nix::mount::{mount, MsFlags};

    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(classify_propagation_error)?;

    log::info!("Mount propagation hardened: / set to MS_PRIVATE|MS_REC");
    Ok(())
}

fn classify_propagation_error(errno: Errno) -> PrivboxError {
    refused_by_host("mount(/, MS_PRIVATE|MS_REC)", errno).unwrap_or_else(|| {
        PrivboxError::Mount(format!(
            "Failed to make / private (MS_PRIVATE|MS_REC): {}. \
            Overlays could propagate to the host mount namespace.",
            errno
        ))
    })
}
