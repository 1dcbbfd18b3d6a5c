//! Parser for `/proc/self/mountinfo`.
//!
//! Line format (see `proc(5)`):
//!
//! ```text
//! 36 35 98:0 /mnt1 /mnt2 rw,noatime master:1 - ext3 /dev/root rw,errors=continue
//! (1)(2)(3)   (4)   (5)      (6)      (7)   (8) (9)   (10)         (11)
//! ```
//!
//! Only the mount point (5) and the filesystem type (9) matter here. The
//! optional fields (7) are variable in number, so the type is located after
//! the lone `-` separator rather than by position.

use std::ffi::OsString;
use std::io::{BufRead, Error, ErrorKind};
use std::os::unix::ffi::OsStringExt as _;
use std::path::PathBuf;

/// One mounted filesystem in the current mount namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    /// Where the filesystem is mounted.
    pub mount_point: PathBuf,
    /// Filesystem type, e.g. `ext4` or `proc`.
    pub fs_type: String,
}

impl MountRecord {
    /// Creates a record from a mount point and filesystem type.
    pub fn new(mount_point: impl Into<PathBuf>, fs_type: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            fs_type: fs_type.into(),
        }
    }
}

/// Parses a mountinfo table, preserving its order.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidData`] on a malformed line, or the
/// underlying read error.
pub fn parse<R: BufRead>(reader: R) -> std::io::Result<Vec<MountRecord>> {
    reader
        .split(b'\n')
        .filter(|line| !matches!(line, Ok(l) if l.is_empty()))
        .map(|line| parse_line(&line?))
        .collect()
}

fn parse_line(line: &[u8]) -> std::io::Result<MountRecord> {
    let malformed = || {
        Error::new(
            ErrorKind::InvalidData,
            format!("malformed mountinfo line: {}", String::from_utf8_lossy(line)),
        )
    };

    let fields: Vec<&[u8]> = line.split(|&b| b == b' ').collect();
    let mount_point = fields.get(4).ok_or_else(malformed)?;
    let separator = fields
        .iter()
        .skip(6)
        .position(|field| *field == b"-")
        .ok_or_else(malformed)?;
    let fs_type = fields.get(6 + separator + 1).ok_or_else(malformed)?;

    let mount_point = unescape(mount_point).ok_or_else(malformed)?;
    Ok(MountRecord {
        mount_point: PathBuf::from(OsString::from_vec(mount_point)),
        fs_type: String::from_utf8_lossy(&unescape(fs_type).ok_or_else(malformed)?).into_owned(),
    })
}

/// Decodes the kernel's `\NNN` octal escapes (space, tab, newline, backslash).
///
/// Returns [`None`] on a truncated or non-octal escape.
fn unescape(field: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(field.len());
    let mut bytes = field.iter();
    while let Some(&b) = bytes.next() {
        if b == b'\\' {
            let digits = [*bytes.next()?, *bytes.next()?, *bytes.next()?];
            if digits.iter().any(|d| !(b'0'..=b'7').contains(d)) {
                return None;
            }
            out.push(((digits[0] - b'0') << 6) | ((digits[1] - b'0') << 3) | (digits[2] - b'0'));
        } else {
            out.push(b);
        }
    }
    Some(out)
}
