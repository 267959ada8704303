/// This test should FAIL to compile
/// Resources can only be handed to an active sandbox

use privbox::harness::bus::{BusConfig, BusSession};
use privbox::kernel::privilege::PrivilegeContext;
use privbox::sandbox::{Sandbox, Uninitialized};

fn main() {
    let mut sandbox = Sandbox::<Uninitialized>::new("test", PrivilegeContext::current());
    let bus = BusSession::start(&BusConfig::new("dbus-daemon", "test")).expect("bus start failed");

    // This should fail: Uninitialized has no register method
    sandbox.register(Box::new(bus));
}
