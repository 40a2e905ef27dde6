use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use d2cc_common::protocol::{
    encode_argv, encode_compile_request, encode_data, encode_discard, encode_hello,
};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::process::{Child, ChildStdout};

use crate::common::init_test_logging;

struct Daemon {
    _dir: TempDir,
    socket: std::path::PathBuf,
    child: Child,
    events: Lines<BufReader<ChildStdout>>,
}

impl Daemon {
    async fn start() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let socket = dir.path().join("d2ccd.sock");
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "[daemon]\nmax_connections = 4\n").unwrap();

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_d2ccd"));
        cmd.env_clear()
            .env("PATH", "/usr/bin:/bin")
            .env("HOME", dir.path())
            .arg("--socket")
            .arg(&socket)
            .arg("--config")
            .arg(&config)
            .arg("--events")
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        let mut child = tokio::process::Command::from(cmd)
            .kill_on_drop(true)
            .spawn()
            .expect("Failed to spawn d2ccd");
        let stdout = child.stdout.take().expect("stdout piped");

        wait_for_socket(&socket).await;
        Self {
            _dir: dir,
            socket,
            child,
            events: BufReader::new(stdout).lines(),
        }
    }

    async fn next_event(&mut self) -> serde_json::Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.events.next_line())
            .await
            .expect("timed out waiting for event")
            .expect("stdout read failed")
            .expect("d2ccd closed stdout");
        serde_json::from_str(&line).expect("event is JSON")
    }

    /// Skip events until one named `name` arrives.
    async fn wait_for(&mut self, name: &str) -> serde_json::Value {
        loop {
            let event = self.next_event().await;
            if event["event"] == name {
                return event;
            }
        }
    }
}

async fn wait_for_socket(path: &Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("d2ccd never created {}", path.display());
}

#[test]
fn test_d2ccd_help_includes_usage() {
    init_test_logging();
    crate::test_log!("TEST START: test_d2ccd_help_includes_usage");

    let output = Command::new(env!("CARGO_BIN_EXE_d2ccd"))
        .arg("--help")
        .output()
        .expect("Failed to run d2ccd --help");

    assert!(output.status.success(), "d2ccd --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("d2ccd"), "unexpected help: {stdout}");
    assert!(stdout.contains("--socket"), "unexpected help: {stdout}");

    crate::test_log!("TEST PASS: test_d2ccd_help_includes_usage");
}

#[tokio::test]
async fn test_daemon_reports_committed_and_discarded_requests() {
    init_test_logging();
    crate::test_log!("TEST START: test_daemon_reports_committed_and_discarded_requests");

    let mut daemon = Daemon::start().await;
    let mut client = UnixStream::connect(&daemon.socket).await.unwrap();
    client.write_all(&encode_hello(0, 0)).await.unwrap();
    client
        .write_all(&encode_argv(["gcc", "-c", "@d2cc_input@", "-o", "@d2cc_output@"]).unwrap())
        .await
        .unwrap();
    client.write_all(&encode_data(b"int x;\n").unwrap()).await.unwrap();
    client.write_all(&encode_compile_request()).await.unwrap();
    client.write_all(&encode_argv(["gcc"]).unwrap()).await.unwrap();
    client.write_all(&encode_discard()).await.unwrap();

    let committed = daemon.wait_for("request_committed").await;
    assert_eq!(committed["data"]["argv"][2], "@d2cc_input@");
    assert_eq!(committed["data"]["data_bytes"], 7);
    assert_eq!(committed["data"]["version"], 0);

    daemon.wait_for("request_discarded").await;
    drop(client);

    let closed = daemon.wait_for("session_closed").await;
    assert_eq!(closed["data"]["committed"], 1);
    assert_eq!(closed["data"]["discarded"], 1);

    crate::test_log!("TEST PASS: test_daemon_reports_committed_and_discarded_requests");
}

#[tokio::test]
async fn test_daemon_closes_channel_on_protocol_error() {
    init_test_logging();
    crate::test_log!("TEST START: test_daemon_closes_channel_on_protocol_error");

    let mut daemon = Daemon::start().await;
    let mut client = UnixStream::connect(&daemon.socket).await.unwrap();
    client.write_all(b"JUNK\0\0\0\x08").await.unwrap();

    let event = daemon.wait_for("protocol_error").await;
    assert_eq!(event["data"]["code"], "D2CC-E102");

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .expect("daemon kept the channel open");
    assert_eq!(read.unwrap_or(0), 0);

    crate::test_log!("TEST PASS: test_daemon_closes_channel_on_protocol_error");
}

#[tokio::test]
async fn test_sigterm_removes_socket() {
    init_test_logging();
    crate::test_log!("TEST START: test_sigterm_removes_socket");

    let mut daemon = Daemon::start().await;
    let pid = daemon.child.id().expect("daemon running");
    let status = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .expect("Failed to run kill");
    assert!(status.success());

    let exit = tokio::time::timeout(Duration::from_secs(5), daemon.child.wait())
        .await
        .expect("d2ccd did not exit")
        .unwrap();
    assert!(exit.success(), "d2ccd exited with {exit:?}");
    assert!(!daemon.socket.exists(), "socket left behind");

    crate::test_log!("TEST PASS: test_sigterm_removes_socket");
}
