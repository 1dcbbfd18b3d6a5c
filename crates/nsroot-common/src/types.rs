//! Domain primitive types used across the nsroot workspace.

use std::fmt;
use std::path::{Path, PathBuf};

/// One directive of a mount plan.
///
/// The first entry of a plan designates the new root (`target == "/"`);
/// every later entry bind-mounts `source` onto `target` inside that root.
/// Both paths are absolute; the loader refuses anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountPlanEntry {
    /// Host path to expose.
    pub source: PathBuf,
    /// Path inside the new root.
    pub target: PathBuf,
}

impl MountPlanEntry {
    /// Creates an entry from a source/target pair.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Target path relative to the new root, with the leading `/` removed.
    ///
    /// A target of `/` itself yields an empty path, which resolves to the
    /// new root when joined to the current directory.
    pub fn relative_target(&self) -> &Path {
        self.target.strip_prefix("/").unwrap_or(&self.target)
    }
}

impl fmt::Display for MountPlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.display(), self.target.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_target_strips_leading_slash() {
        let entry = MountPlanEntry::new("/etc/resolv.conf", "/etc/resolv.conf");
        assert_eq!(entry.relative_target(), Path::new("etc/resolv.conf"));
    }

    #[test]
    fn relative_target_of_root_is_empty() {
        let entry = MountPlanEntry::new("/var/ct/root", "/");
        assert_eq!(entry.relative_target(), Path::new(""));
    }
}
