use std::net::TcpListener;
use std::process::Command;

fn subdebug() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_subdebug"));
    cmd.env_remove("SUBDEBUG_MULTIPROCESS")
        .env_remove("SUBDEBUG_SUBPROCESS_OF")
        .env_remove("SUBDEBUG_SUBPROCESS_NOTIFY");
    cmd
}

#[test]
fn test_notify_unreachable_root_exits_zero() {
    let port = {
        let socket = TcpListener::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap().port()
    };

    let output = subdebug()
        .args(["--subprocess-of", "1", "--subprocess-notify"])
        .arg(port.to_string())
        .arg("notify")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to send subprocess notification"),
        "stderr: {stderr}"
    );
}

#[test]
fn test_notify_requires_subprocess_options() {
    let output = subdebug().arg("notify").output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_patch_prints_command_line() {
    let output = subdebug()
        .args(["--multiprocess", "--subprocess-of", "7", "--subprocess-notify", "4711"])
        .args(["patch", "--", "python", "app.py", "arg"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let line = String::from_utf8_lossy(&output.stdout);
    // notification goes to this process, the root of the spawned tree
    assert!(line.contains("--subprocess-of "), "stdout: {line}");
    assert!(line.contains("--subprocess-notify 4711"), "stdout: {line}");
    assert!(line.trim_end().ends_with("app.py arg"), "stdout: {line}");
}
