/// This test should FAIL to compile
/// A consumed state cannot be used again

use privbox::kernel::privilege::PrivilegeContext;
use privbox::sandbox::{Sandbox, Uninitialized};

fn main() {
    let sandbox = Sandbox::<Uninitialized>::new("test", PrivilegeContext::current());

    let _created = sandbox.create_namespace().expect("namespace creation failed");

    // This should fail: sandbox was moved by create_namespace
    let _again = sandbox.create_namespace();
}
