//! Filesystem overlays for the sandbox
//!
//! Bind mounts tracked for deterministic teardown.

pub mod overlay;

pub use overlay::{OverlayMount, OverlaySpec};
