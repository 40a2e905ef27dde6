use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A temp directory with a fake compiler that logs its compile invocations.
///
/// With `-E` the fake prints `preprocessed:<args>` and exits 0. Otherwise it
/// appends its arguments to `compile.log`, prints `compiled` and exits with
/// `$FAKE_CC_EXIT` (default 0). Like gcc, `-MD` writes `<-o stem>.d` in
/// either mode.
pub struct FakeToolchain {
    pub dir: TempDir,
    pub compiler: PathBuf,
    pub log: PathBuf,
    pub socket: PathBuf,
    pub config: PathBuf,
}

impl FakeToolchain {
    pub fn new() -> Self {
        crate::test_log!("FIXTURE: Creating fake toolchain");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let log = dir.path().join("compile.log");
        let compiler = dir.path().join("fakecc");
        Self::write_compiler(&compiler, &log);

        let config = dir.path().join("config.toml");
        fs::write(&config, "").expect("Failed to write config");

        Self {
            socket: dir.path().join("d2cc.sock"),
            dir,
            compiler,
            log,
            config,
        }
    }

    pub fn write_compiler(path: &Path, log: &Path) {
        let script = format!(
            r#"#!/bin/sh
out=""; prev=""; md=0; pre=0
for a in "$@"; do
  [ "$prev" = "-o" ] && out="$a"
  [ "$a" = "-MD" ] && md=1
  [ "$a" = "-E" ] && pre=1
  prev="$a"
done
if [ "$md" = 1 ] && [ -n "$out" ]; then
  : > "./${{out%.*}}.d"
fi
if [ "$pre" = 1 ]; then
  printf 'preprocessed:%s\n' "$*"
  exit 0
fi
printf '%s\n' "$*" >> '{log}'
echo compiled
exit "${{FAKE_CC_EXIT:-0}}"
"#,
            log = log.display()
        );
        fs::write(path, script).expect("Failed to write fake compiler");
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod fake compiler");
    }

    /// Lines logged by compile (non-preprocess) runs.
    pub fn compile_log(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// The wrapper binary with an isolated environment.
    pub fn wrapper(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.env_clear()
            .env("PATH", "/usr/bin:/bin")
            .env("HOME", self.dir.path())
            .env("D2CC_CONFIG", &self.config)
            .env("D2CC_SOCKET", &self.socket)
            .current_dir(self.dir.path());
        cmd
    }
}
