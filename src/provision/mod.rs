//! Install-time privilege provisioning.
//!
//! Runs after files are copied into place. Idempotent: a second run over a
//! correct tree reports every entry as skipped.

pub mod applier;
pub mod paths;
pub mod report;
pub mod rules;

pub use applier::PrivilegeApplier;
pub use paths::PathResolver;
pub use report::{EntryKind, ProvisionEntry, ProvisionReport};
pub use rules::ProvisionLayout;

use crate::config::settings::ProvisionSettings;
use crate::config::types::Result;
use crate::kernel::credentials::resolve_account_optional;
use crate::kernel::privilege::PrivilegeContext;

/// Resolve the service account, build the rule set and apply it
pub fn run(settings: &ProvisionSettings, context: PrivilegeContext) -> Result<ProvisionReport> {
    let resolver = PathResolver::new(settings.staging_root.clone(), settings.prefix.clone());
    let layout = ProvisionLayout {
        bindir: settings.bindir.clone(),
        datadir: settings.datadir.clone(),
        libdir: settings.libdir.clone(),
        sysconfdir: settings.sysconfdir.clone(),
    };

    let service = resolve_account_optional(&settings.account);
    let mut applier = PrivilegeApplier::new(context);
    if service.is_none() {
        applier = applier.with_missing_account(settings.account.clone());
    }

    log::info!(
        "Provisioning under prefix {} (staging root: {:?}, euid {})",
        settings.prefix.display(),
        resolver.staging_root(),
        context.effective_uid()
    );
    let specs = layout.specs(service.as_ref())?;
    applier.apply(&specs, &resolver)
}
