//! Configuration and shared types
//!
//! Rule/outcome data model, the crate error type, and runtime settings.

pub mod settings;
pub mod types;
