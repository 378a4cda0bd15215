use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::LessonDocument;
use crate::security::{sanitize_json, sanitize_text};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::{json, Value};

const MAX_COMPLETED_ENTRIES: usize = 200;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Resolves a shared lesson reference (id + mode). The target may be either
/// version; the response says which so the student view can render it.
fn handle_resolve_share(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let (default_mode, _) = super::setup::sharing_defaults(conn);
    let mode = match req.params.get("mode").and_then(|v| v.as_str()) {
        None => default_mode,
        Some(raw) => {
            let m = raw.trim().to_ascii_lowercase();
            if m != "teacher" && m != "student" {
                return err(&req.id, "bad_params", "mode must be one of: teacher, student", None);
            }
            m
        }
    };

    match super::lessons::find_lesson(conn, &id) {
        Ok(Some(lesson)) => {
            // Decode through the version-aware document type so a stored
            // entry of either version resolves, and a corrupt one errors.
            let doc: LessonDocument = match serde_json::from_value(lesson.clone()) {
                Ok(d) => d,
                Err(_) => {
                    return err(&req.id, "invalid_structure", "stored lesson is not decodable", None)
                }
            };
            ok(
                &req.id,
                json!({
                    "id": doc.id(),
                    "lesson": lesson,
                    "version": doc.version(),
                    "mode": mode,
                    "readOnly": mode == "student",
                }),
            )
        }
        Ok(None) => err(&req.id, "not_found", format!("no lesson with id {}", id), None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Periodic draft snapshot keyed per lesson. Drafts are mid-edit, so only
/// the pollution strip runs here; the full gate applies on save.
fn handle_autosave(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("lesson") else {
        return err(&req.id, "bad_params", "missing lesson", None);
    };
    let Some(id) = raw.get("id").and_then(Value::as_str).map(str::to_string) else {
        return err(&req.id, "bad_params", "lesson must carry an id", None);
    };

    let snapshot = json!({
        "savedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "lesson": sanitize_json(raw),
    });
    match db::settings_set_json(conn, &db::autosave_key(&id), &snapshot) {
        Ok(()) => ok(&req.id, json!({ "id": id })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_autosave_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match db::settings_get_json(conn, &db::autosave_key(&id)) {
        Ok(snapshot) => ok(&req.id, json!({ "snapshot": snapshot })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_progress_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let completed = match db::settings_get_json(conn, &db::progress_key(&lesson_id)) {
        Ok(Some(stored)) => stored
            .get("completed")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        Ok(None) => Vec::new(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "lessonId": lesson_id, "completed": completed }))
}

fn handle_progress_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let (_, allow_progress) = super::setup::sharing_defaults(conn);
    if !allow_progress {
        return err(
            &req.id,
            "progress_disabled",
            "student progress tracking is disabled in setup",
            None,
        );
    }
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("completed").and_then(Value::as_array) else {
        return err(&req.id, "bad_params", "completed must be an array", None);
    };

    let mut completed: Vec<String> = raw
        .iter()
        .filter_map(Value::as_str)
        .map(|s| sanitize_text(s, 100))
        .filter(|s| !s.is_empty())
        .collect();
    completed.dedup();
    completed.truncate(MAX_COMPLETED_ENTRIES);

    let stored = json!({
        "lessonId": lesson_id,
        "completed": completed,
        "updatedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    match db::settings_set_json(conn, &db::progress_key(&lesson_id), &stored) {
        Ok(()) => ok(&req.id, json!({ "lessonId": lesson_id, "count": completed.len() })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lesson.resolveShare" => Some(handle_resolve_share(state, req)),
        "lesson.autosave" => Some(handle_autosave(state, req)),
        "lesson.autosaveGet" => Some(handle_autosave_get(state, req)),
        "progress.get" => Some(handle_progress_get(state, req)),
        "progress.set" => Some(handle_progress_set(state, req)),
        _ => None,
    }
}
