//! Mount plan file parsing.
//!
//! The whole file is parsed and validated before anything is mounted, so a
//! malformed plan never leaves a half-built root behind.

use std::ffi::OsStr;
use std::io::BufRead;
use std::os::unix::ffi::OsStrExt as _;
use std::path::{Component, Path, PathBuf};

use nsroot_common::error::{NsrootError, Result};
use nsroot_common::types::MountPlanEntry;

use super::MountPlan;

/// Reads and validates a mount plan.
///
/// Each line must hold exactly two space- or tab-separated absolute paths.
/// The first line's target must be exactly `/`, and no target may contain a
/// `..` component.
///
/// # Errors
///
/// Returns [`NsrootError::Plan`] naming the first offending line, or
/// [`NsrootError::Io`] if the plan cannot be read.
pub fn load<R: BufRead>(reader: R, origin: &Path) -> Result<MountPlan> {
    let mut entries = Vec::new();

    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(|source| NsrootError::Io {
            stage: "read",
            path: origin.to_path_buf(),
            source,
        })?;
        let entry = parse_line(&line, idx + 1)?;
        if entries.is_empty() && entry.target != Path::new("/") {
            return Err(NsrootError::Plan {
                line: idx + 1,
                message: format!(
                    "first target must be \"/\", found {:?}",
                    entry.target.display().to_string()
                ),
            });
        }
        entries.push(entry);
    }

    if entries.is_empty() {
        return Err(NsrootError::Plan {
            line: 0,
            message: "plan is empty".into(),
        });
    }

    tracing::debug!(
        origin = %origin.display(),
        entries = entries.len(),
        "mount plan loaded"
    );
    Ok(MountPlan::from_validated(entries))
}

fn parse_line(raw: &[u8], line: usize) -> Result<MountPlanEntry> {
    let trimmed = raw.trim_ascii_end();
    let fields: Vec<&[u8]> = trimmed
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|field| !field.is_empty())
        .collect();

    let [source, target] = fields.as_slice() else {
        return Err(NsrootError::Plan {
            line,
            message: format!("expected 2 fields, found {}", fields.len()),
        });
    };

    let source = absolute(source, line)?;
    let target = absolute(target, line)?;
    if target.components().any(|c| c == Component::ParentDir) {
        return Err(NsrootError::Plan {
            line,
            message: format!("target {} escapes the new root", target.display()),
        });
    }
    Ok(MountPlanEntry { source, target })
}

fn absolute(field: &[u8], line: usize) -> Result<PathBuf> {
    let path = Path::new(OsStr::from_bytes(field));
    if !path.is_absolute() {
        return Err(NsrootError::Plan {
            line,
            message: format!("path {} is not absolute", path.display()),
        });
    }
    Ok(path.to_path_buf())
}
