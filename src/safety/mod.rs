//! Safety and cleanup
//!
//! Guaranteed release of sandbox resources.

pub mod cleanup;
