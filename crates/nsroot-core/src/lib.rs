//! # nsroot-core
//!
//! Low-level Linux isolation primitives for the nsroot launcher.
//!
//! This crate provides safe abstractions over:
//! - **Mount plans**: loading and applying the declarative root layout.
//! - **Filesystem**: the mount syscall seam, mount table parsing, and
//!   pruning of the namespace-private mount table copy.
//! - **Namespaces**: cloning into fresh mount/PID namespaces.
//! - **Signals**: process-wide signal disposition, forwarding, and re-raise.
//! - **Guard**: the close-on-exec liveness token of the target lineage.
//! - **Credentials**: capturing and restoring the invoking identity.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod credentials;
pub mod filesystem;
pub mod guard;
pub mod namespace;
pub mod plan;
pub mod signal;

/// Retries a `nix` call for as long as it fails with `EINTR`.
#[macro_export]
macro_rules! nix_retry {
    ($e:expr) => {
        loop {
            let result = $e;
            if !matches!(
                &result,
                ::core::result::Result::Err(::nix::errno::Errno::EINTR)
            ) {
                break result;
            }
        }
    };
}

/// Retries a raw `libc` call returning `-1`/`errno` for as long as it fails with `EINTR`.
#[macro_export]
macro_rules! libc_retry {
    ($e:expr) => {
        loop {
            let result = ::nix::errno::Errno::result($e);
            if !matches!(
                &result,
                ::core::result::Result::Err(::nix::errno::Errno::EINTR)
            ) {
                break result;
            }
        }
    };
}
