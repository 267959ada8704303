//! Type-state namespace sandbox.
//!
//! The setup sequence is fixed:
//! 1. unshare user + mount namespaces
//! 2. deny setgroups, write gid_map, write uid_map
//! 3. make / recursively private, bind the fixture overlays
//! 4. activate (child processes may run)
//! 5. teardown in reverse acquisition order
//!
//! Each step consumes the prior state and returns exactly one next state on
//! success, so steps cannot be skipped, repeated or reordered.

use crate::config::types::{IdentityMapping, PrivboxError, Result};
use crate::kernel::credentials::IdMapFiles;
use crate::kernel::mount::{OverlayMount, OverlaySpec};
use crate::kernel::namespace;
use crate::kernel::privilege::PrivilegeContext;
use crate::safety::cleanup::{Release, TeardownLedger, TeardownReport};
use std::marker::PhantomData;

/// Type-state marker: nothing set up yet
pub struct Uninitialized;

/// Type-state marker: process is in fresh user + mount namespaces
pub struct NamespaceCreated;

/// Type-state marker: outside identity is mapped to root inside
pub struct IdentityMapped;

/// Type-state marker: fixture overlays are mounted
pub struct Overlaid;

/// Type-state marker: ready for child processes
pub struct Active;

/// Type-state marker: every resource has been released
pub struct TornDown;

pub struct Sandbox<S> {
    session_id: String,
    context: PrivilegeContext,
    mapping: Option<IdentityMapping>,
    idmap: IdMapFiles,
    ledger: TeardownLedger,
    report: TeardownReport,
    _state: PhantomData<S>,
}

impl<S> Sandbox<S> {
    fn into_state<T>(self) -> Sandbox<T> {
        Sandbox {
            session_id: self.session_id,
            context: self.context,
            mapping: self.mapping,
            idmap: self.idmap,
            ledger: self.ledger,
            report: self.report,
            _state: PhantomData,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mapping(&self) -> Option<&IdentityMapping> {
        self.mapping.as_ref()
    }

    /// Resources currently held, in acquisition order
    pub fn resources(&self) -> Vec<String> {
        self.ledger.describe_all()
    }
}

impl Sandbox<Uninitialized> {
    pub fn new(session_id: impl Into<String>, context: PrivilegeContext) -> Self {
        Self::with_idmap(session_id, context, IdMapFiles::for_self())
    }

    /// Use a different set of map files (a child's /proc entry, or a test directory)
    pub fn with_idmap(session_id: impl Into<String>, context: PrivilegeContext, idmap: IdMapFiles) -> Self {
        Self {
            session_id: session_id.into(),
            context,
            mapping: None,
            idmap,
            ledger: TeardownLedger::new(),
            report: TeardownReport::default(),
            _state: PhantomData,
        }
    }

    /// Record the outside identity, then unshare user + mount namespaces.
    ///
    /// Must be called while the process is single-threaded.
    pub fn create_namespace(mut self) -> Result<Sandbox<NamespaceCreated>> {
        self.mapping = Some(IdentityMapping::root_for(
            self.context.effective_uid(),
            self.context.effective_gid(),
        ));
        namespace::enter_user_and_mount_namespaces()?;
        log::info!("[{}] namespace created", self.session_id);
        Ok(self.into_state())
    }
}

impl Sandbox<NamespaceCreated> {
    /// Map the recorded outside identity to root inside the namespace
    pub fn map_identity(self) -> Result<Sandbox<IdentityMapped>> {
        let mapping = self.mapping.ok_or_else(|| {
            PrivboxError::Namespace("no outside identity recorded before mapping".to_string())
        })?;
        self.idmap.apply(&mapping)?;

        // Only meaningful for our own process: a foreign /proc entry says
        // nothing about our effective uid
        if self.idmap.root() == IdMapFiles::for_self().root() {
            let euid = nix::unistd::geteuid().as_raw();
            if euid != mapping.inside_uid {
                return Err(PrivboxError::Namespace(format!(
                    "effective uid is {} after mapping, expected {}",
                    euid, mapping.inside_uid
                )));
            }
        }

        log::info!(
            "[{}] identity mapped: uid {} -> {}, gid {} -> {}",
            self.session_id,
            mapping.outside_uid,
            mapping.inside_uid,
            mapping.outside_gid,
            mapping.inside_gid
        );
        Ok(self.into_state())
    }
}

impl Sandbox<IdentityMapped> {
    /// Harden propagation, then bind each overlay.
    ///
    /// Every mount is recorded right after it succeeds; a later failure drops
    /// the sandbox and the ledger unmounts what was already bound.
    pub fn overlay(mut self, overlays: &[OverlaySpec]) -> Result<Sandbox<Overlaid>> {
        for spec in overlays {
            spec.validate()?;
        }
        namespace::harden_mount_propagation()?;

        for spec in overlays {
            let mount = OverlayMount::bind(spec)?;
            self.ledger.record(Box::new(mount));
        }
        log::info!("[{}] {} overlay(s) mounted", self.session_id, overlays.len());
        Ok(self.into_state())
    }
}

impl Sandbox<Overlaid> {
    pub fn activate(self) -> Sandbox<Active> {
        log::debug!("[{}] sandbox active", self.session_id);
        self.into_state()
    }
}

impl Sandbox<Active> {
    /// Hand a resource acquired inside the sandbox (e.g. a bus daemon) to
    /// the ledger, so it is released before the overlays it may depend on
    pub fn register(&mut self, resource: Box<dyn Release>) {
        self.ledger.record(resource);
    }

    /// Release everything in reverse acquisition order
    pub fn teardown(mut self) -> Sandbox<TornDown> {
        self.report = self.ledger.release_all();
        if !self.report.is_clean() {
            log::warn!(
                "[{}] teardown finished with {} failure(s)",
                self.session_id,
                self.report.failures.len()
            );
        }
        self.into_state()
    }
}

impl Sandbox<TornDown> {
    /// Released resources, most recent first
    pub fn released(&self) -> &[String] {
        &self.report.released
    }

    pub fn failures(&self) -> &[String] {
        &self.report.failures
    }

    pub fn is_clean(&self) -> bool {
        self.report.is_clean()
    }
}
