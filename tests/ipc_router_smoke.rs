use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_planbookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn planbookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    serde_json::from_str(line.trim()).expect("parse response json")
}

#[test]
fn health_reports_version_and_no_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(resp.get("id").and_then(|v| v.as_str()), Some("1"));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
    let result = resp.get("result").expect("result");
    assert!(result.get("version").and_then(|v| v.as_str()).is_some());
    assert!(result.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));
}

#[test]
fn unknown_method_answers_not_implemented() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(&mut stdin, &mut reader, "1", "no.such.method", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );
}

#[test]
fn lesson_methods_require_a_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(&mut stdin, &mut reader, "1", "lesson.list", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_workspace")
    );
}

#[test]
fn bad_json_line_yields_error_envelope() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    writeln!(stdin, "this is not json").expect("write garbage");
    stdin.flush().expect("flush");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let resp: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_json")
    );
}
