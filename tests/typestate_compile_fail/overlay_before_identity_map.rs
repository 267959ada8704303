/// This test should FAIL to compile
/// Overlays require the identity map to be written first

use privbox::kernel::mount::OverlaySpec;
use privbox::kernel::privilege::PrivilegeContext;
use privbox::sandbox::{Sandbox, Uninitialized};

fn main() {
    let sandbox = Sandbox::<Uninitialized>::new("test", PrivilegeContext::current());

    let sandbox = sandbox.create_namespace().expect("namespace creation failed");

    // This should fail: NamespaceCreated has no overlay method
    let _ = sandbox.overlay(&[OverlaySpec::new("/tmp/data/etc", "/etc")]);
}
