//! privbox: privilege provisioning and a namespace test sandbox for a
//! setuid authorization service
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::privilege`]: Explicit ambient-privilege context
//! - [`kernel::credentials`]: Account lookups and uid/gid map writers
//! - [`kernel::namespace`]: User + mount namespace entry
//! - [`kernel::mount`]: Bind overlays with lazy unmount
//! - [`kernel::signal`]: Signal capture and forwarding
//!
//! ## Provisioning ([`provision`])
//! - [`provision::paths`]: Staging-root aware path resolution
//! - [`provision::rules`]: Fixed ownership/mode rules of the install tree
//! - [`provision::applier`]: Idempotent application with degraded outcomes
//! - [`provision::report`]: Per-path outcome report (text and JSON)
//!
//! ## Sandbox ([`sandbox`])
//! Type-state chain: namespace, identity map, overlays, active, torn down.
//!
//! ## Harness ([`harness`])
//! - [`harness::fixture`]: Fixture account database layout
//! - [`harness::bus`]: Private system bus lifecycle
//! - [`harness::session`]: One sandboxed target run
//! - [`harness::runner`]: Skip classification and exit status
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::cleanup`]: Reverse-order teardown ledger
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Shared types and the crate error
//! - [`config::settings`]: Runtime settings and environment variables
//!
//! # Design Principles
//!
//! 1. **Kernel as truth** - Outcomes come from syscalls and /proc, not guesses
//! 2. **Degrade, don't abort** - A missing privilege is a reported outcome
//! 3. **Types prevent errors** - Sandbox setup cannot be reordered
//! 4. **Skip is not failure** - An environment without namespaces exits 77

// Kernel Primitives
pub mod kernel;

// Provisioning
pub mod provision;

// Sandbox
pub mod sandbox;

// Harness
pub mod harness;

// Safety & Cleanup
pub mod safety;

// Configuration
pub mod config;

// CLI front-end
pub mod cli;

pub use config::types::{PrivboxError, Result};
