use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

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

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn v1_lesson(id: &str, title: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "structure": "tbl",
        "leadIn": { "title": "", "description": "", "text": "", "mediaLinks": [] },
        "presentation": { "title": "", "targetLanguage": "", "explanation": "", "mediaLinks": [] },
        "controlledPractice": { "type": "controlled", "exercises": [] },
        "freePractice": { "type": "free", "exercises": [] },
        "createdAt": "2026-06-01T10:00:00Z"
    })
}

#[test]
fn bundle_moves_a_collection_between_workspaces() {
    let source = temp_dir("planbook-bundle-src");
    let target = temp_dir("planbook-bundle-dst");
    let bundle_path = temp_dir("planbook-bundle-file").join("library.zip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "lesson.save",
        json!({ "lesson": v1_lesson("b1", "Bundle one") }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "lesson.save",
        json!({ "lesson": v1_lesson("b2", "Bundle two") }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.exportBundle",
        json!({ "outPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(exported.get("lessonCount").and_then(|v| v.as_u64()), Some(2));
    assert!(bundle_path.is_file());

    // Restore into a fresh workspace.
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "workspace.select",
        json!({ "path": target.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "workspace.importBundle",
        json!({ "path": bundle_path.to_string_lossy() }),
    );
    assert_eq!(imported.get("imported").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(imported.get("skipped").and_then(|v| v.as_u64()), Some(0));

    let listed = request_ok(&mut stdin, &mut reader, "7", "lesson.list", json!({}));
    let lessons = listed.get("lessons").and_then(|v| v.as_array()).expect("array");
    assert_eq!(lessons.len(), 2);
}

#[test]
fn bundle_reimport_replaces_by_id_and_bad_paths_error() {
    let workspace = temp_dir("planbook-bundle-skip");
    let bundle_dir = temp_dir("planbook-bundle-skip-file");
    let bundle_path = bundle_dir.join("mixed.zip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "lesson.save",
        json!({ "lesson": v1_lesson("keep", "Valid") }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.exportBundle",
        json!({ "outPath": bundle_path.to_string_lossy() }),
    );

    // Importing into the same workspace must replace by id, not duplicate.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.importBundle",
        json!({ "path": bundle_path.to_string_lossy() }),
    );
    assert_eq!(again.get("imported").and_then(|v| v.as_u64()), Some(1));

    let listed = request_ok(&mut stdin, &mut reader, "5", "lesson.list", json!({}));
    let lessons = listed.get("lessons").and_then(|v| v.as_array()).expect("array");
    assert_eq!(lessons.len(), 1, "replace-by-id must not duplicate");

    let missing = request(
        &mut stdin,
        &mut reader,
        "6",
        "workspace.importBundle",
        json!({ "path": bundle_dir.join("nope.zip").to_string_lossy() }),
    );
    assert_eq!(
        missing.pointer("/error/code").and_then(|v| v.as_str()),
        Some("import_failed")
    );
}
