//! How the wrapper was invoked and which real compiler stands behind it.

use d2cc_common::errors::ErrorCode;
use d2cc_common::util::basename;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name the wrapper answers to in prefix mode (`d2cc gcc -c foo.c`).
pub const WRAPPER_NAME: &str = "d2cc";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no compiler named on the command line")]
    NoCompiler,
    #[error("real compiler {0:?} not found on PATH")]
    NotFound(OsString),
}

impl ResolveError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::LocalCompilerNotFound
    }
}

/// The compiler argv as the compiler itself would have seen it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<OsString>,
    /// Invoked as `d2cc <compiler> ...` rather than through a symlink.
    pub prefixed: bool,
}

impl Invocation {
    pub fn from_args(mut args: Vec<OsString>) -> Self {
        let prefixed = args
            .first()
            .is_some_and(|arg0| basename(arg0) == OsStr::new(WRAPPER_NAME));
        if prefixed {
            args.remove(0);
        }
        Self {
            argv: args,
            prefixed,
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Locate the real compiler for `argv0`.
///
/// A configured compiler wins. A path containing `/` is used as given unless
/// it leads back to the wrapper. Otherwise `path_var` is searched for the
/// basename, skipping every entry that is the wrapper itself.
pub fn resolve_compiler(
    argv0: &OsStr,
    configured: Option<&Path>,
    self_exe: Option<&Path>,
    path_var: Option<&OsStr>,
) -> Result<PathBuf, ResolveError> {
    if let Some(compiler) = configured {
        debug!(compiler = %compiler.display(), "using configured compiler");
        return Ok(compiler.to_path_buf());
    }
    if argv0.is_empty() {
        return Err(ResolveError::NoCompiler);
    }

    let is_wrapper = |candidate: &Path| self_exe.is_some_and(|me| same_file(candidate, me));

    let direct = Path::new(argv0);
    if argv0.as_bytes().contains(&b'/') && !is_wrapper(direct) {
        return Ok(direct.to_path_buf());
    }

    let name = basename(argv0);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let found = which::which_in_all(name, path_var, cwd)
        .ok()
        .and_then(|mut candidates| candidates.find(|c| !is_wrapper(c.as_path())));
    match found {
        Some(path) => {
            debug!(compiler = %path.display(), "resolved compiler on PATH");
            Ok(path)
        }
        None => Err(ResolveError::NotFound(name.to_os_string())),
    }
}
