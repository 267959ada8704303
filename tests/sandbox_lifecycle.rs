/// Full sandbox chain inside this test process: bind a fixture directory over
/// a host directory, then check the host content is back after teardown.
///
/// Prints a skip line and exits 0 when the host cannot create user namespaces.
use privbox::kernel::mount::OverlaySpec;
use privbox::kernel::privilege::PrivilegeContext;
use privbox::sandbox::{Sandbox, Uninitialized};
use privbox::Result;
use std::fs;

const MARKER: &str = "passwd";

fn main() {
    let host = tempfile::tempdir().unwrap();
    let fixture = tempfile::tempdir().unwrap();
    fs::write(host.path().join(MARKER), "root:x:0:0::/root:/bin/sh\n").unwrap();
    fs::write(fixture.path().join(MARKER), "testuser:x:5000:5000::/:/bin/sh\n").unwrap();
    let read_marker = || fs::read_to_string(host.path().join(MARKER)).unwrap();

    let overlays = [OverlaySpec::new(fixture.path(), host.path())];
    let setup = || -> Result<_> {
        Ok(Sandbox::<Uninitialized>::new("lifecycle", PrivilegeContext::current())
            .create_namespace()?
            .map_identity()?
            .overlay(&overlays)?
            .activate())
    };
    let sandbox = match setup() {
        Ok(sandbox) => sandbox,
        Err(e) if e.is_skip() => {
            println!("sandbox_lifecycle: skipped: {}", e);
            return;
        }
        Err(e) => panic!("sandbox setup failed: {}", e),
    };

    assert!(read_marker().starts_with("testuser:"), "fixture must shadow the host directory");
    assert_eq!(sandbox.resources().len(), 1);

    let torn = sandbox.teardown();
    assert!(torn.is_clean(), "teardown failures: {:?}", torn.failures());
    assert_eq!(torn.released().len(), 1);
    assert!(read_marker().starts_with("root:"), "host content must be visible after teardown");

    println!("sandbox_lifecycle: ok");
}
