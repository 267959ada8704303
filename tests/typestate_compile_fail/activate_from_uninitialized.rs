/// This test should FAIL to compile
/// A fresh sandbox cannot be activated without namespaces, mapping and overlays

use privbox::kernel::privilege::PrivilegeContext;
use privbox::sandbox::{Sandbox, Uninitialized};

fn main() {
    let sandbox = Sandbox::<Uninitialized>::new("test", PrivilegeContext::current());

    // This should fail: Uninitialized has no activate method
    let _active = sandbox.activate();
}
