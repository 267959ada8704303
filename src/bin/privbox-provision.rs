use anyhow::Result;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    privbox::cli::run(privbox::cli::CliMode::Provision)
}
