use crate::config::settings::{HarnessSettings, ProvisionSettings};
use crate::harness::{HarnessExit, HarnessRunner};
use crate::kernel::privilege::PrivilegeContext;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CliMode {
    Provision,
    Harness,
}

impl CliMode {
    fn binary_name(self) -> &'static str {
        match self {
            Self::Provision => "privbox-provision",
            Self::Harness => "privbox-harness",
        }
    }
}

/// Apply ownership and mode rules to an installed tree
#[derive(Parser, Debug)]
#[command(name = "privbox-provision", author, version, about, long_about = None)]
struct ProvisionCli {
    /// Executable directory (holds the privileged launcher)
    bindir: PathBuf,
    /// Data directory (gets a rules.d)
    datadir: PathBuf,
    /// Library directory (holds the authentication helper)
    libdir: PathBuf,
    /// Configuration directory (gets a rules.d)
    sysconfdir: PathBuf,
    /// Service account owning the rule directories
    account: String,
    /// Base for relative directories (default: $MESON_INSTALL_PREFIX, then /usr/local)
    #[arg(long)]
    prefix: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Run a test command in a disposable namespace sandbox
#[derive(Parser, Debug)]
#[command(name = "privbox-harness", author, version, about, long_about = None)]
struct HarnessCli {
    /// Command line run through the shell inside the sandbox
    target: String,
    /// Fixture directory; its etc/ is overlaid onto /etc
    #[arg(long)]
    data_dir: PathBuf,
    /// Start a private system bus for the target
    #[arg(long)]
    mock_dbus: bool,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .try_init();
}

pub fn run(mode: CliMode) -> Result<ExitCode> {
    if !cfg!(target_os = "linux") {
        eprintln!("Error: {} requires Linux", mode.binary_name());
        return Ok(ExitCode::FAILURE);
    }

    match mode {
        CliMode::Provision => run_provision(ProvisionCli::parse()),
        CliMode::Harness => run_harness(HarnessCli::parse()),
    }
}

fn run_provision(cli: ProvisionCli) -> Result<ExitCode> {
    init_logging(cli.verbose);

    let settings = ProvisionSettings {
        bindir: cli.bindir,
        datadir: cli.datadir,
        libdir: cli.libdir,
        sysconfdir: cli.sysconfdir,
        account: cli.account,
        prefix: ProvisionSettings::prefix_from(cli.prefix),
        staging_root: ProvisionSettings::staging_root_from_env(),
    };

    let report = match crate::provision::run(&settings, PrivilegeContext::current()) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }
    if report.has_degraded() {
        log::warn!("Provisioning finished with degraded entries; see remediation above");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_harness(cli: HarnessCli) -> Result<ExitCode> {
    init_logging(cli.verbose);

    let settings = HarnessSettings::new(cli.target, cli.data_dir, cli.mock_dbus);
    let runner = HarnessRunner::new(settings, PrivilegeContext::current());

    match runner.run() {
        Ok(HarnessExit::Skipped(reason)) => {
            eprintln!("SKIP: {}", reason);
            Ok(exit_code(crate::harness::SKIP_EXIT_CODE))
        }
        Ok(HarnessExit::Child(code)) => Ok(exit_code(code)),
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Exit statuses outside 0..=255 cannot be reported; collapse them to 1
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
