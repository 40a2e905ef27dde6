//! True E2E Tests: the wrapper in front of a real C compiler.
//!
//! Gated behind the `true-e2e` feature flag. Each test skips when no `cc` is
//! installed.
//!
//! ```bash
//! cargo test -p d2cc --features true-e2e --test true_e2e -- --nocapture
//! ```

use d2cc_common::protocol::{Message, read_message};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;
use tokio::net::UnixListener;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("tests")
        .join("true_e2e")
        .join("fixtures")
}

fn require_cc() -> Option<PathBuf> {
    match which::which("cc") {
        Ok(path) => Some(path),
        Err(_) => {
            eprintln!("Skipping: no cc on PATH");
            None
        }
    }
}

/// Copy a fixture into a fresh temp dir.
fn stage(fixture: &str) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for entry in std::fs::read_dir(fixtures_dir().join(fixture)).expect("fixture exists") {
        let entry = entry.expect("fixture entry");
        std::fs::copy(entry.path(), dir.path().join(entry.file_name()))
            .expect("Failed to copy fixture");
    }
    dir
}

fn wrapper(dir: &Path, socket: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_d2cc"));
    cmd.current_dir(dir)
        .env("D2CC_SOCKET", socket)
        .env("D2CC_CONFIG", dir.join("absent.toml"))
        .env_remove("D2CC_COMPILER");
    cmd
}

fn assert_elf_object(output: &Output, object: &Path) {
    assert!(output.status.success(), "compile failed: {output:?}");
    let bytes = std::fs::read(object).expect("object file written");
    assert_eq!(&bytes[..4], b"\x7fELF", "not an ELF object");
}

#[test]
fn test_real_compile_without_daemon() {
    let Some(_cc) = require_cc() else { return };
    let dir = stage("hello_c");
    let output = wrapper(dir.path(), &dir.path().join("none.sock"))
        .args(["cc", "-c", "hello.c", "-o", "hello.o"])
        .output()
        .expect("Failed to run d2cc");
    assert_elf_object(&output, &dir.path().join("hello.o"));
}

#[test]
fn test_real_compile_error_matches_direct_compile() {
    let Some(_cc) = require_cc() else { return };
    let dir = stage("broken_c");
    let output = wrapper(dir.path(), &dir.path().join("none.sock"))
        .env("D2CC_LOG", "off")
        .args(["cc", "-c", "broken.c"])
        .output()
        .expect("Failed to run d2cc");
    assert!(!output.status.success());

    let direct = Command::new("cc")
        .current_dir(dir.path())
        .args(["-c", "broken.c"])
        .output()
        .expect("Failed to run cc");
    assert_eq!(output.status.code(), direct.status.code());
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&direct.stderr),
        "wrapper changed compiler diagnostics"
    );
    assert!(!dir.path().join("broken.o").exists());
}

#[tokio::test]
async fn test_real_preprocessed_source_reaches_daemon() {
    let Some(_cc) = require_cc() else { return };
    let dir = stage("hello_c");
    let socket = dir.path().join("d2cc.sock");
    let listener = UnixListener::bind(&socket).expect("bind socket");
    let daemon = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut data = Vec::new();
        let mut argv = Vec::new();
        while let Some(msg) = read_message(&mut stream).await.expect("valid stream") {
            match msg {
                Message::ArgV(args) => argv.extend(args),
                Message::Data(chunk) => data.extend(chunk),
                _ => {}
            }
        }
        (argv, data)
    });

    let cmd = {
        let mut cmd = wrapper(dir.path(), &socket);
        cmd.args(["cc", "-c", "hello.c", "-o", "hello.o"]);
        cmd
    };
    let output = tokio::process::Command::from(cmd)
        .output()
        .await
        .expect("Failed to run d2cc");
    assert_elf_object(&output, &dir.path().join("hello.o"));

    let (argv, data) = daemon.await.expect("daemon task");
    assert_eq!(argv, ["cc", "-c", "@d2cc_input@", "-o", "@d2cc_output@"]);
    let text = String::from_utf8_lossy(&data);
    assert!(text.contains("hello from d2cc"), "macro not expanded");
    assert!(!text.contains("#include \"greeting.h\""));
}

#[tokio::test]
async fn test_real_dependency_file_matches_local_build() {
    let Some(_cc) = require_cc() else { return };
    let dir = stage("hello_c");
    let socket = dir.path().join("d2cc.sock");
    let listener = UnixListener::bind(&socket).expect("bind socket");
    let daemon = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        while read_message(&mut stream).await.expect("valid stream").is_some() {}
    });

    let cmd = {
        let mut cmd = wrapper(dir.path(), &socket);
        cmd.args(["cc", "-MD", "-c", "hello.c", "-o", "hello.o"]);
        cmd
    };
    let output = tokio::process::Command::from(cmd)
        .output()
        .await
        .expect("Failed to run d2cc");
    assert_elf_object(&output, &dir.path().join("hello.o"));
    daemon.await.expect("daemon task");

    assert!(!dir.path().join("-.d").exists(), "stray -.d in build dir");
    let deps = std::fs::read_to_string(dir.path().join("hello.d")).expect("hello.d written");
    assert!(deps.starts_with("hello.o:"), "unexpected deps: {deps}");
    assert!(deps.contains("greeting.h"));
}
