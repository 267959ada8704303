//! Collected outcomes of one provisioning run.

use crate::config::types::{PrivilegeOutcome, ResolvedPath, SkipReason};
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    Artifact,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvisionEntry {
    pub path: ResolvedPath,
    pub kind: EntryKind,
    #[serde(flatten)]
    pub outcome: PrivilegeOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    entries: Vec<ProvisionEntry>,
}

impl ProvisionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: ResolvedPath, kind: EntryKind, outcome: PrivilegeOutcome) {
        self.entries.push(ProvisionEntry {
            path,
            kind,
            outcome,
        });
    }

    pub fn entries(&self) -> &[ProvisionEntry] {
        &self.entries
    }

    pub fn degraded(&self) -> impl Iterator<Item = &ProvisionEntry> {
        self.entries.iter().filter(|e| e.outcome.is_degraded())
    }

    pub fn has_degraded(&self) -> bool {
        self.degraded().next().is_some()
    }

    /// Every entry was already in its final state
    pub fn is_noop(&self) -> bool {
        self.entries
            .iter()
            .all(|e| matches!(e.outcome, PrivilegeOutcome::Skipped { .. }))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match &entry.outcome {
                PrivilegeOutcome::Applied => writeln!(f, "applied   {}", entry.path)?,
                PrivilegeOutcome::Skipped { reason } => {
                    let why = match reason {
                        SkipReason::AlreadyExists => "already exists, left untouched",
                        SkipReason::AlreadyCorrect => "already correct",
                    };
                    writeln!(f, "skipped   {} ({})", entry.path, why)?
                }
                PrivilegeOutcome::Degraded {
                    reason,
                    remediation,
                } => {
                    writeln!(f, "degraded  {} ({})", entry.path, reason)?;
                    writeln!(f, "          -> {}", remediation)?
                }
            }
        }
        Ok(())
    }
}
