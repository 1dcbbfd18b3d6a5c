//! Applies a loaded mount plan inside the new mount namespace.

use std::path::Path;

use nsroot_common::error::{NsrootError, Result};

use super::MountPlan;
use crate::filesystem::Mounter;

/// Builds the new root described by `plan`.
///
/// The inherited mount tree is made private first. The current directory
/// then moves to the new root, and every later entry is bind-mounted onto
/// its target resolved from that directory, so the root path is looked up
/// exactly once. Stops at the first failure; nothing is rolled back.
///
/// # Errors
///
/// Returns [`NsrootError::Setup`] naming the failing step and target.
pub fn execute<M: Mounter>(plan: &MountPlan, mounter: &mut M) -> Result<()> {
    mounter
        .make_private()
        .map_err(|e| NsrootError::setup("make-private", "/", e))?;

    let root = plan.new_root();
    mounter
        .change_dir(root)
        .map_err(|e| NsrootError::setup("chdir", root.display().to_string(), e))?;

    for entry in plan.binds() {
        let target = Path::new(".").join(entry.relative_target());
        mounter.bind(&entry.source, &target).map_err(|e| {
            NsrootError::setup("mount", entry.target.display().to_string(), e)
        })?;
        tracing::debug!(%entry, "bind mounted");
    }

    tracing::info!(
        root = %root.display(),
        binds = plan.binds().len(),
        "mount plan applied"
    );
    Ok(())
}
