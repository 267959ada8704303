/// Creation-time directory modes
///
/// Alone in its own test binary: it changes the process umask.
use privbox::config::types::{DirectorySpec, PrivilegeOutcome};
use privbox::kernel::privilege::PrivilegeContext;
use privbox::provision::{PathResolver, PrivilegeApplier};
use nix::sys::stat::{umask, Mode};
use std::os::unix::fs::MetadataExt;

#[test]
fn directory_mode_ignores_restrictive_umask() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("share/rules.d");
    let previous = umask(Mode::from_bits_truncate(0o077));

    let report = PrivilegeApplier::new(PrivilegeContext::current())
        .apply(&[DirectorySpec::new(&dir, 0o755).into()], &PathResolver::new(None, "/"))
        .unwrap();
    let restored = umask(previous);

    assert_eq!(report.entries()[0].outcome, PrivilegeOutcome::Applied);
    assert_eq!(std::fs::metadata(&dir).unwrap().mode() & 0o7777, 0o755);
    // The applier puts the caller's umask back
    assert_eq!(restored.bits(), 0o077);
}
