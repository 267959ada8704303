/// This test should FAIL to compile
/// Identity mapping cannot happen outside a fresh user namespace

use privbox::kernel::privilege::PrivilegeContext;
use privbox::sandbox::{Sandbox, Uninitialized};

fn main() {
    let sandbox = Sandbox::<Uninitialized>::new("test", PrivilegeContext::current());

    // This should fail: Uninitialized has no map_identity method
    let _ = sandbox.map_identity();
}
