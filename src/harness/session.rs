//! One sandboxed harness invocation: namespace, overlays, optional bus and
//! the target process, released in reverse acquisition order.

use crate::config::settings::{HarnessSettings, ACCOUNT_DATABASE_DIR};
use crate::config::types::{PrivboxError, Result};
use crate::harness::bus::{BusConfig, BusSession};
use crate::harness::fixture::FixtureLayout;
use crate::kernel::mount::OverlaySpec;
use crate::kernel::privilege::PrivilegeContext;
use crate::kernel::signal::{forward_to, SignalForwarder};
use crate::sandbox::{Active, Sandbox, TornDown, Uninitialized};
use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct SandboxSession {
    sandbox: Sandbox<Active>,
    env: Vec<(String, OsString)>,
    forwarder: SignalForwarder,
}

impl SandboxSession {
    /// Enter the namespace, overlay the fixture and start the bus if asked.
    ///
    /// Termination signals are captured from the first step on, so an
    /// interrupt during setup still tears down through the ledger.
    pub fn open(settings: &HarnessSettings, fixture: &FixtureLayout, context: PrivilegeContext) -> Result<Self> {
        let forwarder = SignalForwarder::install().map_err(PrivboxError::Process)?;
        let overlays = [OverlaySpec::new(fixture.etc_dir(), ACCOUNT_DATABASE_DIR)];

        let mut sandbox = Sandbox::<Uninitialized>::new(settings.session_id.clone(), context)
            .create_namespace()?
            .map_identity()?
            .overlay(&overlays)?
            .activate();

        let mut env: Vec<(String, OsString)> = fixture
            .env()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.into_os_string()))
            .collect();

        if settings.use_bus {
            let bus = BusSession::start(&BusConfig::new(&settings.dbus_daemon, &settings.session_id))?;
            let (key, address) = bus.env();
            env.push((key.to_string(), address.into()));
            // Registered after the overlays, so it stops before they unmount
            sandbox.register(Box::new(bus));
        }
        interrupted_during_setup(&forwarder)?;

        Ok(Self {
            sandbox,
            env,
            forwarder,
        })
    }

    /// Run `shell -c target` and wait, forwarding termination signals.
    ///
    /// Returns the target's exit code; a signal death maps to 128 + signo.
    pub fn run_target(&self, settings: &HarnessSettings) -> Result<i32> {
        let child = Command::new(&settings.shell)
            .arg("-c")
            .arg(&settings.target)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .spawn()
            .map_err(|e| {
                PrivboxError::Process(format!(
                    "failed to spawn {} -c {:?}: {}",
                    settings.shell.display(),
                    settings.target,
                    e
                ))
            })?;
        let mut target = TargetProcess(Some(child));
        log::info!("[{}] target started: {}", self.sandbox.session_id(), settings.target);

        let status = target.wait_forwarding(&self.forwarder)?;
        let code = exit_code(status);
        log::info!("[{}] target finished with {}", self.sandbox.session_id(), code);
        Ok(code)
    }

    pub fn close(self) -> Sandbox<TornDown> {
        self.sandbox.teardown()
    }
}

/// A signal caught before the target exists aborts the session; dropping the
/// sandbox then releases whatever was acquired
fn interrupted_during_setup(forwarder: &SignalForwarder) -> Result<()> {
    match forwarder.take_pending() {
        Some(sig) => Err(PrivboxError::Process(format!(
            "interrupted by {:?} during sandbox setup",
            sig
        ))),
        None => Ok(()),
    }
}

/// Target child; killed and reaped if the harness bails out while it runs
struct TargetProcess(Option<Child>);

impl TargetProcess {
    fn wait_forwarding(&mut self, forwarder: &SignalForwarder) -> Result<ExitStatus> {
        let child = self
            .0
            .as_mut()
            .ok_or_else(|| PrivboxError::Process("target already reaped".to_string()))?;
        loop {
            if let Some(sig) = forwarder.take_pending() {
                log::info!("Forwarding {:?} to target {}", sig, child.id());
                forward_to(child.id(), sig);
            }
            if let Some(status) = child.try_wait()? {
                self.0 = None;
                return Ok(status);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for TargetProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.0.take() {
            log::warn!("Killing target {} left running", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Shell convention: 128 + signal number for signal deaths
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => 128 + sig,
        (None, None) => 1,
    }
}
