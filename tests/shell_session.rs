use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Output, Stdio};

fn run_session(dir: &Path, input: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_mysh"))
        .current_dir(dir)
        .env("MYSH_HISTORY", "")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_pipeline_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_session(dir.path(), "echo hello world | tr a-z A-Z\n");
    assert_eq!(stdout_of(&output), "HELLO WORLD\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_last_status_expansion() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fail");
    fs::write(&script, "#!/bin/sh\nexit 7\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let input = format!("{}\necho $?\n", script.display());
    let output = run_session(dir.path(), &input);
    assert_eq!(stdout_of(&output), "7\n");
}

#[test]
fn test_command_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_session(dir.path(), "no-such-command-xyz\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no-such-command-xyz: command not found"));
    assert_eq!(output.status.code(), Some(127));
}

#[test]
fn test_redirections() {
    let dir = tempfile::tempdir().unwrap();
    let input = "echo abc > out.txt\ncat < out.txt\nsort < missing.txt\n";
    let output = run_session(dir.path(), input);
    assert_eq!(stdout_of(&output), "abc\n");
    assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "abc\n");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.txt: file not found"));
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_export_and_exit() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_session(dir.path(), "export GREETING=hi\necho $GREETING\nexit 4\necho unreachable\n");
    assert_eq!(stdout_of(&output), "hi\n");
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_background_notice() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_session(dir.path(), "sleep 0 &\n");
    let stdout = stdout_of(&output);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("[1] "), "unexpected notice: {:?}", first);
    assert!(first.ends_with(" sleep"), "unexpected notice: {:?}", first);
}
