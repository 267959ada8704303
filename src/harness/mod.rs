//! Test harness: runs a target command inside a disposable sandbox with a
//! fixture account database and, optionally, a private system bus.

pub mod bus;
pub mod fixture;
pub mod runner;
pub mod session;

pub use bus::{BusConfig, BusHandle, BusSession};
pub use fixture::FixtureLayout;
pub use runner::{HarnessExit, HarnessRunner, SKIP_EXIT_CODE};
pub use session::SandboxSession;
