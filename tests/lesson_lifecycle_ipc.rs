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
        "structure": "ppp",
        "leadIn": {
            "title": "Warmer",
            "description": "Quick chat",
            "text": "Talk in pairs about your week.",
            "mediaLinks": [],
            "duration": 5
        },
        "presentation": {
            "title": "Target language",
            "targetLanguage": "present perfect",
            "explanation": "have/has + past participle",
            "examples": ["I have been to Rome."],
            "mediaLinks": [],
            "duration": 15
        },
        "controlledPractice": { "type": "controlled", "exercises": [] },
        "freePractice": { "type": "free", "exercises": [] },
        "createdAt": "2026-03-01T09:00:00Z"
    })
}

#[test]
fn create_save_get_list_delete_cycle() {
    let workspace = temp_dir("planbook-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Fresh skeleton carries the setup defaults.
    let created = request_ok(&mut stdin, &mut reader, "2", "lesson.create", json!({}));
    let lesson = created.get("lesson").expect("lesson");
    assert_eq!(lesson.get("structure").and_then(|v| v.as_str()), Some("ppp"));
    assert_eq!(lesson.get("duration").and_then(|v| v.as_u64()), Some(45));
    assert!(lesson.get("id").and_then(|v| v.as_str()).is_some());
    assert!(lesson.get("version").is_none(), "v1 documents carry no marker");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "lesson.save",
        json!({ "lesson": v1_lesson("l-cycle", "Present perfect") }),
    );
    assert_eq!(saved.get("id").and_then(|v| v.as_str()), Some("l-cycle"));
    assert_eq!(saved.get("version").and_then(|v| v.as_u64()), Some(1));

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lesson.get",
        json!({ "id": "l-cycle" }),
    );
    assert_eq!(fetched.get("version").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        fetched.pointer("/lesson/title").and_then(|v| v.as_str()),
        Some("Present perfect")
    );

    let listed = request_ok(&mut stdin, &mut reader, "5", "lesson.list", json!({}));
    let lessons = listed.get("lessons").and_then(|v| v.as_array()).expect("array");
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0].get("id").and_then(|v| v.as_str()), Some("l-cycle"));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "lesson.delete",
        json!({ "id": "l-cycle" }),
    );
    assert_eq!(deleted.get("deleted").and_then(|v| v.as_bool()), Some(true));

    let gone = request(
        &mut stdin,
        &mut reader,
        "7",
        "lesson.get",
        json!({ "id": "l-cycle" }),
    );
    assert_eq!(gone.pointer("/error/code").and_then(|v| v.as_str()), Some("not_found"));
}

#[test]
fn save_rejects_malformed_lessons_and_sanitizes_valid_ones() {
    let workspace = temp_dir("planbook-save-gate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let rejected = request(
        &mut stdin,
        &mut reader,
        "2",
        "lesson.save",
        json!({ "lesson": { "id": "x", "title": "no sections" } }),
    );
    assert_eq!(
        rejected.pointer("/error/code").and_then(|v| v.as_str()),
        Some("invalid_structure")
    );

    let mut lesson = v1_lesson("l-gate", "Tag <soup> lesson");
    lesson["leadIn"]["mediaLinks"] = json!(["javascript:alert(1)", "https://example.com/ok"]);
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "lesson.save",
        json!({ "lesson": lesson }),
    );

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lesson.get",
        json!({ "id": "l-gate" }),
    );
    assert_eq!(
        fetched.pointer("/lesson/title").and_then(|v| v.as_str()),
        Some("Tag soup lesson")
    );
    assert_eq!(
        fetched.pointer("/lesson/leadIn/mediaLinks"),
        Some(&json!(["https://example.com/ok"]))
    );
}

#[test]
fn setup_defaults_flow_into_created_lessons() {
    let workspace = temp_dir("planbook-setup-defaults");
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
        "setup.update",
        json!({ "section": "lessons", "patch": { "defaultDurationMinutes": 60, "defaultStructure": "tbl" } }),
    );

    let setup = request_ok(&mut stdin, &mut reader, "3", "setup.get", json!({}));
    assert_eq!(
        setup.pointer("/lessons/defaultDurationMinutes").and_then(|v| v.as_i64()),
        Some(60)
    );

    let created = request_ok(&mut stdin, &mut reader, "4", "lesson.create", json!({}));
    assert_eq!(
        created.pointer("/lesson/structure").and_then(|v| v.as_str()),
        Some("tbl")
    );
    assert_eq!(
        created.pointer("/lesson/duration").and_then(|v| v.as_u64()),
        Some(60)
    );

    let bad = request(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({ "section": "lessons", "patch": { "defaultStructure": "waterfall" } }),
    );
    assert_eq!(bad.pointer("/error/code").and_then(|v| v.as_str()), Some("bad_params"));
}
