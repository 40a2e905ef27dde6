//! Shared utilities for d2cc.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

/// Everything after the last `/`, or the whole string when there is none.
///
/// Works on raw bytes so non-UTF-8 paths survive unchanged.
pub fn basename(path: &OsStr) -> &OsStr {
    let bytes = path.as_bytes();
    match bytes.iter().rposition(|b| *b == b'/') {
        Some(pos) => OsStr::from_bytes(&bytes[pos + 1..]),
        None => path,
    }
}

/// Render an argv as a single shell-quoted line for diagnostics.
pub fn display_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    args.into_iter()
        .map(|arg| shell_escape::unix::escape(arg.as_ref().to_string_lossy()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
