//! Private system message bus for one harness run.
//!
//! Only the daemon lifecycle lives here; the bus protocol is the daemon's
//! business.

use crate::config::types::{PrivboxError, Result};
use crate::safety::cleanup::Release;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Variable the target reads to find the bus
pub const SYSTEM_BUS_ADDRESS_ENV: &str = "DBUS_SYSTEM_BUS_ADDRESS";

const STOP_GRACE: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Daemon executable
    pub daemon: PathBuf,
    /// Prefix for the temporary configuration directory
    pub session_id: String,
}

impl BusConfig {
    pub fn new(daemon: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            daemon: daemon.into(),
            session_id: session_id.into(),
        }
    }
}

pub struct BusSession;

impl BusSession {
    /// Write a private configuration, spawn the daemon and read its address.
    ///
    /// The handle exists as soon as the process does, so every failure after
    /// spawn still stops the daemon.
    pub fn start(config: &BusConfig) -> Result<BusHandle> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("privbox-bus-{}-", config.session_id))
            .tempdir()?;
        let socket = dir.path().join("system_bus_socket");
        let conf = dir.path().join("system.conf");
        std::fs::write(&conf, render_config(&socket))?;

        let child = Command::new(&config.daemon)
            .arg("--nofork")
            .arg(format!("--config-file={}", conf.display()))
            .arg("--print-address=1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&config.daemon, e))?;

        log::info!("Started bus daemon {} (pid {})", config.daemon.display(), child.id());
        let mut handle = BusHandle {
            child: Some(child),
            address: String::new(),
            _dir: dir,
        };
        handle.address = handle.read_address()?;
        log::debug!("Bus address: {}", handle.address);
        Ok(handle)
    }
}

/// Running bus daemon plus its configuration directory
#[derive(Debug)]
pub struct BusHandle {
    child: Option<Child>,
    address: String,
    _dir: tempfile::TempDir,
}

impl BusHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// (variable, value) the target needs to reach the bus
    pub fn env(&self) -> (&'static str, String) {
        (SYSTEM_BUS_ADDRESS_ENV, self.address.clone())
    }

    fn read_address(&mut self) -> Result<String> {
        let stdout = self
            .child
            .as_mut()
            .and_then(|c| c.stdout.take())
            .ok_or_else(|| PrivboxError::Bus("bus daemon stdout is not captured".to_string()))?;

        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line)?;
        let address = line.trim();
        if address.is_empty() {
            let status = self.stop()?;
            return Err(PrivboxError::Bus(format!(
                "bus daemon exited without printing an address ({})",
                status.map_or_else(|| "no status".to_string(), |s| s.to_string())
            )));
        }
        Ok(address.to_string())
    }

    /// SIGTERM, wait out the grace period, then SIGKILL. Safe to call twice.
    pub fn stop(&mut self) -> Result<Option<std::process::ExitStatus>> {
        let mut child = match self.child.take() {
            Some(child) => child,
            None => return Ok(None),
        };

        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let pid = Pid::from_raw(child.id() as i32);
        if let Err(e) = kill(pid, Signal::SIGTERM) {
            log::debug!("SIGTERM to bus daemon {} failed: {}", pid, e);
        }

        let deadline = Instant::now() + STOP_GRACE;
        while Instant::now() < deadline {
            if let Some(status) = child.try_wait()? {
                log::debug!("Bus daemon {} stopped: {}", pid, status);
                return Ok(Some(status));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        log::warn!("Bus daemon {} ignored SIGTERM; killing", pid);
        child.kill()?;
        Ok(Some(child.wait()?))
    }
}

impl Release for BusHandle {
    fn describe(&self) -> String {
        match self.pid() {
            Some(pid) => format!("bus daemon (pid {})", pid),
            None => "bus daemon (stopped)".to_string(),
        }
    }

    fn release(&mut self) -> Result<()> {
        self.stop().map(|_| ())
    }
}

impl Drop for BusHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Failed to stop bus daemon: {}", e);
        }
    }
}

fn spawn_error(daemon: &Path, err: std::io::Error) -> PrivboxError {
    match err.kind() {
        ErrorKind::NotFound => PrivboxError::Unsupported {
            facility: format!("bus daemon {}", daemon.display()),
            remediation: "install dbus-daemon or point PRIVBOX_DBUS_DAEMON at it".to_string(),
        },
        _ => PrivboxError::Bus(format!("failed to spawn {}: {}", daemon.display(), err)),
    }
}

/// System-bus configuration accepting any local connection
fn render_config(socket: &Path) -> String {
    format!(
        r#"<!DOCTYPE busconfig PUBLIC "-//freedesktop//DTD D-BUS Bus Configuration 1.0//EN"
 "http://www.freedesktop.org/standards/dbus/1.0/busconfig.dtd">
<busconfig>
  <type>system</type>
  <keep_umask/>
  <listen>unix:path={}</listen>
  <auth>EXTERNAL</auth>
  <policy context="default">
    <allow user="*"/>
    <allow own="*"/>
    <allow send_destination="*" eavesdrop="true"/>
    <allow receive_sender="*"/>
    <allow eavesdrop="true"/>
  </policy>
</busconfig>
"#,
        socket.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn config_listens_on_private_socket() {
        let conf = render_config(Path::new("/tmp/x/system_bus_socket"));
        assert!(conf.contains("<type>system</type>"));
        assert!(conf.contains("<listen>unix:path=/tmp/x/system_bus_socket</listen>"));
    }

    #[test]
    fn missing_daemon_is_a_skip() {
        let config = BusConfig::new("/nonexistent/privbox/dbus-daemon", "t");
        let err = BusSession::start(&config).unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn fake_daemon_address_is_read_and_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = script(
            dir.path(),
            "fake-daemon",
            "echo unix:path=/tmp/fake_bus_socket\nexec sleep 30\n",
        );

        let mut handle = BusSession::start(&BusConfig::new(daemon, "t")).unwrap();
        assert_eq!(handle.address(), "unix:path=/tmp/fake_bus_socket");
        assert_eq!(handle.env().0, SYSTEM_BUS_ADDRESS_ENV);
        assert!(handle.is_running());

        assert!(handle.stop().unwrap().is_some());
        assert!(!handle.is_running());
        assert!(handle.stop().unwrap().is_none());
    }

    #[test]
    fn daemon_exiting_silently_is_a_bus_error() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = script(dir.path(), "silent-daemon", "exit 3\n");
        let err = BusSession::start(&BusConfig::new(daemon, "t")).unwrap_err();
        assert!(matches!(err, PrivboxError::Bus(_)));
    }
}
