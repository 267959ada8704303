/// This test should FAIL to compile
/// A torn-down sandbox cannot be torn down again

use privbox::kernel::privilege::PrivilegeContext;
use privbox::sandbox::{Sandbox, Uninitialized};

fn main() {
    let sandbox = Sandbox::<Uninitialized>::new("test", PrivilegeContext::current())
        .create_namespace()
        .expect("namespace creation failed")
        .map_identity()
        .expect("identity mapping failed")
        .overlay(&[])
        .expect("overlay failed")
        .activate();

    let torn = sandbox.teardown();

    // This should fail: TornDown has no teardown method
    let _ = torn.teardown();
}
