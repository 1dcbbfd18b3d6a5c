//! # nsroot-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the nsroot workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and carries no Linux-specific code, so every layer above
//! can share the same error shape and exit-code table.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
