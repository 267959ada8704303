//! Async-safe signal capture for the harness
//!
//! The harness must survive SIGINT/SIGTERM/SIGHUP long enough to forward the
//! signal to the target and tear the sandbox down. The handler only stores
//! the signal number; the wait loop does the rest.

use log::info;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicI32, Ordering};

/// Last signal received (0 if none)
static SIGNAL_RECEIVED: AtomicI32 = AtomicI32::new(0);

const FORWARDED_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

/// Installed signal handlers; previous dispositions are restored on drop
pub struct SignalForwarder {
    previous: Vec<(Signal, SigAction)>,
}

impl SignalForwarder {
    /// Install handlers for SIGINT, SIGTERM, SIGHUP.
    /// Must be called before any threads are spawned.
    pub fn install() -> Result<Self, String> {
        SIGNAL_RECEIVED.store(0, Ordering::SeqCst);

        let sig_action = SigAction::new(
            SigHandler::Handler(Self::signal_handler),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        let mut previous = Vec::with_capacity(FORWARDED_SIGNALS.len());
        for sig in FORWARDED_SIGNALS {
            // SAFETY: the handler only performs an atomic store.
            let old = unsafe { signal::sigaction(sig, &sig_action) }
                .map_err(|e| format!("Failed to install {} handler: {}", sig, e))?;
            previous.push((sig, old));
        }

        info!("Signal handlers installed (SIGINT, SIGTERM, SIGHUP)");
        Ok(Self { previous })
    }

    extern "C" fn signal_handler(signal: libc::c_int) {
        SIGNAL_RECEIVED.store(signal, Ordering::SeqCst);
    }

    /// Take the pending signal, if any
    pub fn take_pending(&self) -> Option<Signal> {
        let raw = SIGNAL_RECEIVED.swap(0, Ordering::SeqCst);
        if raw == 0 {
            None
        } else {
            Signal::try_from(raw).ok()
        }
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        for (sig, old) in self.previous.drain(..) {
            // SAFETY: restoring a disposition previously returned by sigaction.
            if let Err(e) = unsafe { signal::sigaction(sig, &old) } {
                log::warn!("Failed to restore {} disposition: {}", sig, e);
            }
        }
    }
}

/// Deliver a forwarded signal to a child process
pub fn forward_to(pid: u32, sig: Signal) {
    let pid = nix::unistd::Pid::from_raw(pid as libc::pid_t);
    match signal::kill(pid, sig) {
        Ok(()) => info!("Forwarded {} to child {}", sig, pid),
        Err(e) => log::debug!("Could not forward {} to {}: {}", sig, pid, e),
    }
}
