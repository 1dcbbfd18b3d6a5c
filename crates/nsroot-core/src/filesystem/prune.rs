//! Pruning of the mount table copied into a fresh mount namespace.
//!
//! `CLONE_NEWNS` hands the new namespace a full copy of the host's mount
//! table. Everything the command should not see is unmounted here, before
//! the root switch. Only the namespace-private copy is touched.

use std::path::{Path, PathBuf};

use nsroot_common::constants::PROC_FS_TYPE;

use super::{MountRecord, Mounter};

/// Outcome of a pruning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneSummary {
    /// Mounts left in place.
    pub kept: usize,
    /// Mounts successfully unmounted.
    pub removed: usize,
    /// Unmounts that failed and were ignored.
    pub failed: usize,
}

/// Whether a mount survives pruning.
///
/// A mount survives only if it sits at or under `new_root` (compared by
/// path components, so `/srv/rootfs2` is not under `/srv/rootfs`) and is
/// not a `proc` mount.
pub fn keeps(new_root: &Path, record: &MountRecord) -> bool {
    record.fs_type != PROC_FS_TYPE && record.mount_point.starts_with(new_root)
}

/// Mount points to unmount, deepest-first.
///
/// The table is in mount order, so walking it backwards unmounts children
/// before the parents they sit on.
pub fn select_unmounts(new_root: &Path, table: &[MountRecord]) -> Vec<PathBuf> {
    table
        .iter()
        .rev()
        .filter(|record| !keeps(new_root, record))
        .map(|record| record.mount_point.clone())
        .collect()
}

/// Unmounts every mount that [`keeps`] rejects.
///
/// Best-effort: the table is read once and every candidate is collected
/// before the first unmount. Failures (typically `EBUSY` on ancestors of the
/// new root) are logged and skipped; they become unreachable after the
/// root switch anyway.
pub fn prune<M: Mounter>(mounter: &mut M, new_root: &Path) -> PruneSummary {
    let table = match mounter.mount_table() {
        Ok(table) => table,
        Err(e) => {
            tracing::warn!(error = %e, "cannot read mount table, skipping prune");
            return PruneSummary::default();
        }
    };

    let doomed = select_unmounts(new_root, &table);
    let mut summary = PruneSummary {
        kept: table.len() - doomed.len(),
        ..PruneSummary::default()
    };

    for mount_point in &doomed {
        match mounter.unmount(mount_point) {
            Ok(()) => summary.removed += 1,
            Err(e) => {
                tracing::debug!(
                    mount_point = %mount_point.display(),
                    error = %e,
                    "unmount failed, leaving it"
                );
                summary.failed += 1;
            }
        }
    }

    tracing::debug!(
        new_root = %new_root.display(),
        kept = summary.kept,
        removed = summary.removed,
        failed = summary.failed,
        "mount table pruned"
    );
    summary
}
