use std::os::unix::fs::symlink;
use std::path::Path;

use d2cc_common::protocol::{Message, read_message};
use tokio::net::UnixListener;

use crate::common::{FakeToolchain, assert_contains, init_test_logging};

fn wrapper_bin() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_d2cc"))
}

#[test]
fn test_fallback_when_daemon_absent() {
    init_test_logging();
    crate::test_log!("TEST START: test_fallback_when_daemon_absent");

    let fx = FakeToolchain::new();
    let output = fx
        .wrapper(wrapper_bin())
        .arg(&fx.compiler)
        .args(["-c", "foo.c", "-o", "foo.o"])
        .output()
        .expect("Failed to run d2cc");

    assert!(output.status.success(), "d2cc failed: {output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "compiled\n");
    assert_eq!(fx.compile_log(), vec!["-c foo.c -o foo.o"]);
    crate::test_log!("TEST PASS: test_fallback_when_daemon_absent");
}

#[test]
fn test_exit_status_passes_through() {
    init_test_logging();
    crate::test_log!("TEST START: test_exit_status_passes_through");

    let fx = FakeToolchain::new();
    let output = fx
        .wrapper(wrapper_bin())
        .env("FAKE_CC_EXIT", "3")
        .arg(&fx.compiler)
        .args(["-c", "broken.c"])
        .output()
        .expect("Failed to run d2cc");

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(fx.compile_log(), vec!["-c broken.c"]);
    crate::test_log!("TEST PASS: test_exit_status_passes_through");
}

#[test]
fn test_stdin_input_runs_locally() {
    init_test_logging();
    crate::test_log!("TEST START: test_stdin_input_runs_locally");

    let fx = FakeToolchain::new();
    let output = fx
        .wrapper(wrapper_bin())
        .env("D2CC_LOG", "debug")
        .arg(&fx.compiler)
        .args(["-x", "c", "-c", "-"])
        .output()
        .expect("Failed to run d2cc");

    assert!(output.status.success());
    assert_eq!(fx.compile_log(), vec!["-x c -c -"]);
    assert_contains(&String::from_utf8_lossy(&output.stderr), "input from stdin");
    crate::test_log!("TEST PASS: test_stdin_input_runs_locally");
}

#[test]
fn test_masquerade_does_not_reexecute_itself() {
    init_test_logging();
    crate::test_log!("TEST START: test_masquerade_does_not_reexecute_itself");

    let fx = FakeToolchain::new();
    let bin = fx.dir.path().join("bin");
    let real = fx.dir.path().join("real");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::create_dir_all(&real).unwrap();
    symlink(wrapper_bin(), bin.join("cc")).unwrap();
    FakeToolchain::write_compiler(&real.join("cc"), &fx.log);

    let path_var = format!("{}:{}:/usr/bin:/bin", bin.display(), real.display());
    let output = fx
        .wrapper(&bin.join("cc"))
        .env("PATH", path_var)
        .args(["-c", "foo.c"])
        .output()
        .expect("Failed to run masquerading d2cc");

    assert!(output.status.success(), "masquerade failed: {output:?}");
    assert_eq!(fx.compile_log(), vec!["-c foo.c"]);
    crate::test_log!("TEST PASS: test_masquerade_does_not_reexecute_itself");
}

#[test]
fn test_missing_compiler_exits_nonzero() {
    init_test_logging();
    crate::test_log!("TEST START: test_missing_compiler_exits_nonzero");

    let fx = FakeToolchain::new();
    let output = fx
        .wrapper(wrapper_bin())
        .args(["no-such-compiler-d2cc", "-c", "foo.c"])
        .output()
        .expect("Failed to run d2cc");

    assert_eq!(output.status.code(), Some(1));
    assert_contains(&String::from_utf8_lossy(&output.stderr), "Unable to spawn compiler");
    crate::test_log!("TEST PASS: test_missing_compiler_exits_nonzero");
}

#[tokio::test]
async fn test_remote_attempt_streams_then_falls_back() {
    init_test_logging();
    crate::test_log!("TEST START: test_remote_attempt_streams_then_falls_back");

    let fx = FakeToolchain::new();
    let listener = UnixListener::bind(&fx.socket).unwrap();
    let daemon = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut messages = Vec::new();
        while let Some(msg) = read_message(&mut stream).await.unwrap() {
            messages.push(msg);
        }
        messages
    });

    let mut cmd = fx.wrapper(wrapper_bin());
    cmd.arg(&fx.compiler).args(["-c", "foo.c", "-o", "foo.o"]);
    let output = tokio::process::Command::from(cmd)
        .output()
        .await
        .expect("Failed to run d2cc");

    assert!(output.status.success(), "d2cc failed: {output:?}");
    assert_contains(
        &String::from_utf8_lossy(&output.stderr),
        "remote protocol not implemented",
    );
    assert_eq!(fx.compile_log(), vec!["-c foo.c -o foo.o"]);

    let messages = daemon.await.unwrap();
    assert_eq!(
        messages,
        vec![
            Message::Hello { version: 0, flags: 0 },
            Message::ArgV(
                ["fakecc", "-c", "@d2cc_input@", "-o", "@d2cc_output@"]
                    .iter()
                    .map(Into::into)
                    .collect()
            ),
            Message::Data(b"preprocessed:-E foo.c -o -\n".to_vec()),
            Message::CompileRequest,
        ]
    );
    crate::test_log!("TEST PASS: test_remote_attempt_streams_then_falls_back");
}

#[tokio::test]
async fn test_dependency_flags_leave_no_stray_file() {
    init_test_logging();
    crate::test_log!("TEST START: test_dependency_flags_leave_no_stray_file");

    let fx = FakeToolchain::new();
    let listener = UnixListener::bind(&fx.socket).unwrap();
    let daemon = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut messages = Vec::new();
        while let Some(msg) = read_message(&mut stream).await.unwrap() {
            messages.push(msg);
        }
        messages
    });

    let mut cmd = fx.wrapper(wrapper_bin());
    cmd.arg(&fx.compiler).args(["-MD", "-c", "foo.c", "-o", "foo.o"]);
    let output = tokio::process::Command::from(cmd)
        .output()
        .await
        .expect("Failed to run d2cc");
    assert!(output.status.success(), "d2cc failed: {output:?}");

    let messages = daemon.await.unwrap();
    assert!(messages.contains(&Message::Data(b"preprocessed:-E foo.c -o -\n".to_vec())));
    assert!(messages.contains(&Message::CompileRequest));

    assert!(!fx.dir.path().join("-.d").exists(), "stray -.d in build dir");
    assert!(fx.dir.path().join("foo.d").exists(), "local compile writes foo.d");
    assert_eq!(fx.compile_log(), vec!["-MD -c foo.c -o foo.o"]);
    crate::test_log!("TEST PASS: test_dependency_flags_leave_no_stray_file");
}

#[tokio::test]
async fn test_rejected_invocation_ignores_reachable_daemon() {
    init_test_logging();
    crate::test_log!("TEST START: test_rejected_invocation_ignores_reachable_daemon");

    let fx = FakeToolchain::new();
    let listener = UnixListener::bind(&fx.socket).unwrap();
    let rejected = ["-c", "a.c", "b.c"];

    let mut with_daemon = fx.wrapper(wrapper_bin());
    with_daemon.arg(&fx.compiler).args(rejected);
    let reachable = tokio::process::Command::from(with_daemon)
        .output()
        .await
        .expect("Failed to run d2cc");

    let accepted =
        tokio::time::timeout(std::time::Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "wrapper connected for a rejected argv");

    let mut without_daemon = fx.wrapper(wrapper_bin());
    without_daemon
        .env("D2CC_SOCKET", fx.dir.path().join("absent.sock"))
        .arg(&fx.compiler)
        .args(rejected);
    let unreachable = tokio::process::Command::from(without_daemon)
        .output()
        .await
        .expect("Failed to run d2cc");

    assert_eq!(reachable.status.code(), unreachable.status.code());
    assert_eq!(reachable.stdout, unreachable.stdout);
    assert_eq!(reachable.stderr, unreachable.stderr);
    assert_eq!(fx.compile_log(), vec!["-c a.c b.c", "-c a.c b.c"]);
    crate::test_log!("TEST PASS: test_rejected_invocation_ignores_reachable_daemon");
}
