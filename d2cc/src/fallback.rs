//! Local compile: replace this process with the real compiler.

use d2cc_common::util::basename;
use std::ffi::OsString;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

/// Build the command that runs `program` with the original argv.
///
/// argv[0] is the compiler's basename, as if it had been called directly.
pub fn local_command(program: &Path, argv: &[OsString]) -> Command {
    let arg0 = argv
        .first()
        .map(|a| basename(a))
        .unwrap_or_else(|| program.as_os_str());
    let mut cmd = Command::new(program);
    cmd.arg0(arg0).args(argv.iter().skip(1));
    cmd
}

/// Exec the real compiler. Only returns if the exec itself failed.
pub fn exec_local(program: &Path, argv: &[OsString]) -> io::Error {
    local_command(program, argv).exec()
}
