//! Declarative mount plans.
//!
//! A plan is a plain-text file, one `SOURCE TARGET` directive per line. The
//! first directive names the new root (`SOURCE /`); every later one is a
//! bind mount placed inside that root.

pub mod executor;
pub mod loader;

use std::path::{Component, Path, PathBuf};

use nsroot_common::error::{NsrootError, Result};
use nsroot_common::types::MountPlanEntry;

pub use executor::execute;
pub use loader::load;

/// An ordered, validated mount plan.
///
/// Only [`loader::load`] constructs one, so a `MountPlan` always has at least
/// one entry and its first target is `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPlan {
    entries: Vec<MountPlanEntry>,
}

impl MountPlan {
    pub(crate) const fn from_validated(entries: Vec<MountPlanEntry>) -> Self {
        Self { entries }
    }

    /// Host directory that becomes the new root.
    pub fn new_root(&self) -> &Path {
        &self.entries[0].source
    }

    /// Bind mounts to perform under the new root, in plan order.
    pub fn binds(&self) -> &[MountPlanEntry] {
        &self.entries[1..]
    }
}

/// Resolves a plan name inside the fixed plan directory.
///
/// Names are bare file names: anything that could walk out of `plan_dir`
/// (`/`, `.`, `..`, or the empty string) is rejected.
///
/// # Errors
///
/// Returns [`NsrootError::Config`] if the name is not a plain file name.
pub fn resolve_plan_path(plan_dir: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) if !name.contains('/') => Ok(plan_dir.join(file)),
        _ => Err(NsrootError::config(format!("invalid plan name {name:?}"))),
    }
}
