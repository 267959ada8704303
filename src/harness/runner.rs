//! Top-level harness: fixture, sandbox session, target, teardown.

use crate::config::settings::HarnessSettings;
use crate::config::types::Result;
use crate::harness::fixture::FixtureLayout;
use crate::harness::session::SandboxSession;
use crate::kernel::privilege::PrivilegeContext;
use std::path::Path;

/// Conventional "skipped" status understood by meson and automake
pub const SKIP_EXIT_CODE: i32 = 77;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HarnessExit {
    /// Target ran; its exit code (128 + signo for signal deaths)
    Child(i32),
    /// Environment cannot host the sandbox
    Skipped(String),
}

impl HarnessExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessExit::Child(code) => *code,
            HarnessExit::Skipped(_) => SKIP_EXIT_CODE,
        }
    }
}

pub struct HarnessRunner {
    settings: HarnessSettings,
    context: PrivilegeContext,
}

impl HarnessRunner {
    pub fn new(settings: HarnessSettings, context: PrivilegeContext) -> Self {
        Self { settings, context }
    }

    /// Run the target in a fresh sandbox.
    ///
    /// Skip-classified setup failures become `HarnessExit::Skipped`; all
    /// other failures are errors. The sandbox is torn down on every path.
    pub fn run(&self) -> Result<HarnessExit> {
        // Checked before any namespace work: a broken fixture is a failure, not a skip
        let fixture = FixtureLayout::load(&self.settings.data_dir)?;

        let session = match SandboxSession::open(&self.settings, &fixture, self.context) {
            Ok(session) => session,
            Err(e) if e.is_skip() => {
                log::info!("[{}] skipping: {}", self.settings.session_id, e);
                return Ok(HarnessExit::Skipped(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let result = session.run_target(&self.settings);
        let torn = session.close();
        for failure in torn.failures() {
            log::warn!("[{}] {}", self.settings.session_id, failure);
        }
        log::debug!("[{}] released {:?}", self.settings.session_id, torn.released());

        result.map(HarnessExit::Child)
    }
}

/// Convenience entry with default settings for the given target
pub fn run(target: &str, data_dir: &Path, use_bus: bool) -> Result<HarnessExit> {
    HarnessRunner::new(
        HarnessSettings::new(target, data_dir, use_bus),
        PrivilegeContext::current(),
    )
    .run()
}
