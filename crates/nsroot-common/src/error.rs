//! Unified error type for the nsroot workspace.
//!
//! Every variant renders as a single `stage:detail: system-message` line,
//! which is exactly what the launcher prints before exiting with
//! [`EXIT_SETUP_FAILURE`](crate::constants::EXIT_SETUP_FAILURE).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum NsrootError {
    /// A file could not be opened or read.
    #[error("{stage}:{path}: {source}")]
    Io {
        /// Step that touched the file.
        stage: &'static str,
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or argument is invalid.
    #[error("config:{message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A mount plan line is malformed or unsafe.
    #[error("plan:line {line}: {message}")]
    Plan {
        /// 1-based line number in the plan file.
        line: usize,
        /// What is wrong with the line.
        message: String,
    },

    /// Namespace construction failed (clone, mount, chroot, `/proc`).
    #[error("{stage}:{detail}: {source}")]
    Setup {
        /// Failing step, e.g. `mount` or `chroot`.
        stage: &'static str,
        /// Object of the step, usually a path.
        detail: String,
        /// Underlying system error.
        source: std::io::Error,
    },

    /// Forking or switching identity failed.
    #[error("{stage}: {source}")]
    Privilege {
        /// Failing step, e.g. `fork` or `setresuid`.
        stage: &'static str,
        /// Underlying system error.
        source: std::io::Error,
    },

    /// The target command could not be executed.
    #[error("exec {command}: {source}")]
    Exec {
        /// Command as given by the caller.
        command: String,
        /// Underlying system error.
        source: std::io::Error,
    },
}

impl NsrootError {
    /// Builds a [`NsrootError::Setup`] from anything convertible into an I/O error.
    pub fn setup(
        stage: &'static str,
        detail: impl Into<String>,
        source: impl Into<std::io::Error>,
    ) -> Self {
        Self::Setup {
            stage,
            detail: detail.into(),
            source: source.into(),
        }
    }

    /// Builds a [`NsrootError::Privilege`] from anything convertible into an I/O error.
    pub fn privilege(stage: &'static str, source: impl Into<std::io::Error>) -> Self {
        Self::Privilege {
            stage,
            source: source.into(),
        }
    }

    /// Builds a [`NsrootError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NsrootError>;
