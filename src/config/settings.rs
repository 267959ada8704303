/// Runtime settings for the provisioner and the sandbox harness
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Staging root variable set by install drivers
pub const STAGING_ROOT_ENV: &str = "DESTDIR";

/// Install prefix variable exported by meson to install scripts
pub const INSTALL_PREFIX_ENV: &str = "MESON_INSTALL_PREFIX";

pub const DEFAULT_PREFIX: &str = "/usr/local";

/// Bus daemon override
pub const DBUS_DAEMON_ENV: &str = "PRIVBOX_DBUS_DAEMON";

pub const DEFAULT_DBUS_DAEMON: &str = "dbus-daemon";

/// Shell override for the target command line
pub const SHELL_ENV: &str = "PRIVBOX_SHELL";

pub const DEFAULT_SHELL: &str = "/bin/sh";

/// System path the fixture account database is overlaid onto
pub const ACCOUNT_DATABASE_DIR: &str = "/etc";

/// Settings for one provisioning run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvisionSettings {
    pub bindir: PathBuf,
    pub datadir: PathBuf,
    pub libdir: PathBuf,
    pub sysconfdir: PathBuf,
    /// Service account owning the rule directories
    pub account: String,
    /// Base for relative directory arguments
    pub prefix: PathBuf,
    /// Optional root every absolute destination is staged under
    pub staging_root: Option<PathBuf>,
}

impl ProvisionSettings {
    /// Staging root from the environment; empty means unset
    pub fn staging_root_from_env() -> Option<PathBuf> {
        non_empty_env(STAGING_ROOT_ENV).map(PathBuf::from)
    }

    /// Explicit prefix wins, then the install driver's, then the default
    pub fn prefix_from(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| non_empty_env(INSTALL_PREFIX_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PREFIX))
    }
}

/// Settings for one harness invocation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarnessSettings {
    /// Shell command line run inside the sandbox
    pub target: String,
    /// Fixture root containing etc/
    pub data_dir: PathBuf,
    /// Start a private system bus
    pub use_bus: bool,
    pub shell: PathBuf,
    pub dbus_daemon: PathBuf,
    /// Correlates log lines and temporary paths of one run
    pub session_id: String,
}

impl HarnessSettings {
    pub fn new(target: impl Into<String>, data_dir: impl Into<PathBuf>, use_bus: bool) -> Self {
        Self {
            target: target.into(),
            data_dir: data_dir.into(),
            use_bus,
            shell: non_empty_env(SHELL_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL)),
            dbus_daemon: non_empty_env(DBUS_DAEMON_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DBUS_DAEMON)),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
