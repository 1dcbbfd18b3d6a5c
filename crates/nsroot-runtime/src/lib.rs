//! Process side of the nsroot launcher.
//!
//! Everything that happens once the plan is known: the clone into fresh
//! namespaces, the entry point that builds the new root inside them, the
//! supervisors that stand in for init, and the mapping of the command's
//! termination onto the launcher's own.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod entry;
pub mod launcher;
pub mod supervisor;
pub mod termination;
