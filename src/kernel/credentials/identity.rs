//! Local account database lookups.

use crate::config::types::{Identity, PrivboxError, Result};
use nix::unistd::User;

/// Look up a named account through the local passwd database.
pub fn resolve_account(name: &str) -> Result<Identity> {
    if name.is_empty() {
        return Err(PrivboxError::IdentityNotFound(String::new()));
    }

    match User::from_name(name) {
        Ok(Some(user)) => {
            log::debug!(
                "Resolved account {} to uid={} gid={}",
                name,
                user.uid,
                user.gid
            );
            Ok(Identity {
                name: user.name,
                uid: user.uid.as_raw(),
                gid: user.gid.as_raw(),
            })
        }
        Ok(None) => Err(PrivboxError::IdentityNotFound(name.to_string())),
        Err(e) => {
            // getpwnam_r reports some "no such entry" conditions as errors
            log::warn!("Account lookup for {} failed: {}", name, e);
            Err(PrivboxError::IdentityNotFound(name.to_string()))
        }
    }
}

/// Same lookup, degrading to None so ownership becomes advisory
pub fn resolve_account_optional(name: &str) -> Option<Identity> {
    match resolve_account(name) {
        Ok(identity) => Some(identity),
        Err(e) => {
            log::warn!("{} (ownership will be advisory only)", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_account_resolves_to_uid_zero() {
        let root = resolve_account("root").expect("root must exist");
        assert_eq!(root.uid, 0);
        assert_eq!(root.name, "root");
    }

    #[test]
    fn missing_account_is_not_found() {
        let err = resolve_account("privbox-no-such-account").unwrap_err();
        assert!(matches!(err, PrivboxError::IdentityNotFound(ref n) if n == "privbox-no-such-account"));
    }

    #[test]
    fn empty_name_is_not_found() {
        assert!(resolve_account("").is_err());
    }

    #[test]
    fn optional_lookup_degrades() {
        assert!(resolve_account_optional("privbox-no-such-account").is_none());
    }
}
