//! Thin wrappers around Linux kernel primitives.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: privilege -> credentials -> namespace -> mount -> signal

pub mod credentials;
pub mod mount;
pub mod namespace;
pub mod privilege;
pub mod signal;
