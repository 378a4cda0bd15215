use crate::bundle;
use crate::db;
use crate::exchange;
use crate::ipc::error::{err, import_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{is_activity_lesson, ActivityLesson, Lesson};
use crate::schema::validate_lesson_structure;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn required_path(req: &Request, key: &str) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Exports either the lesson passed inline (the in-progress document from
/// the authoring flow) or a stored lesson looked up by id. Only the v1 file
/// format exists; an activity-based target is refused.
fn handle_lesson_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let out_dir = match required_path(req, "outDir") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let lesson: Lesson = if let Some(raw) = req.params.get("lesson") {
        match super::lessons::gate_phase_lesson(raw) {
            Ok(lesson) => lesson,
            Err(msg) => return err(&req.id, "invalid_structure", msg, None),
        }
    } else if let Some(id) = req.params.get("id").and_then(Value::as_str) {
        let stored = match super::lessons::find_lesson(conn, id) {
            Ok(Some(v)) => v,
            Ok(None) => {
                return err(&req.id, "not_found", format!("no lesson with id {}", id), None)
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if is_activity_lesson(&stored) {
            return err(
                &req.id,
                "unsupported_version",
                "activity-based lessons have no v1 file format",
                None,
            );
        }
        match serde_json::from_value(stored) {
            Ok(lesson) => lesson,
            Err(_) => {
                return err(&req.id, "invalid_structure", "stored lesson is not decodable", None)
            }
        }
    } else {
        return err(&req.id, "bad_params", "missing lesson or id", None);
    };

    match exchange::export_lesson_to_json(&lesson, &out_dir) {
        Ok(path) => {
            let filename = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            ok(
                &req.id,
                json!({ "path": path.to_string_lossy(), "filename": filename }),
            )
        }
        Err(e) => err(&req.id, "export_failed", e.to_string(), None),
    }
}

fn handle_lesson_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let path = match required_path(req, "path") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let save = req
        .params
        .get("save")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let lesson = match exchange::import_lesson_from_json(&path) {
        Ok(lesson) => lesson,
        Err(e) => {
            tracing::warn!(path = %path.to_string_lossy(), code = e.code(), "lesson import rejected");
            return import_err(&req.id, &e);
        }
    };
    let value = match serde_json::to_value(&lesson) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "internal", e.to_string(), None),
    };

    if save {
        if let Err(e) = super::lessons::upsert_lesson(conn, &lesson.id, value.clone()) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    ok(&req.id, json!({ "lesson": value, "saved": save }))
}

fn acceptable_bundle_entry(entry: &Value) -> bool {
    if entry.get("id").and_then(Value::as_str).is_none() {
        return false;
    }
    if is_activity_lesson(entry) {
        serde_json::from_value::<ActivityLesson>(entry.clone()).is_ok()
    } else {
        validate_lesson_structure(entry)
            && serde_json::from_value::<Lesson>(entry.clone()).is_ok()
    }
}

fn handle_bundle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let out_path = match required_path(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let lessons = match db::load_lessons(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match bundle::export_lessons_bundle(&lessons, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": out_path.to_string_lossy(),
                "lessonCount": summary.lesson_count,
            }),
        ),
        Err(e) => err(&req.id, "export_failed", e.to_string(), None),
    }
}

fn handle_bundle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let path = match required_path(req, "path") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let entries = match bundle::import_lessons_bundle(&path) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "import_failed", e.to_string(), None),
    };

    let mut lessons = match db::load_lessons(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut imported = 0usize;
    let mut skipped = 0usize;
    for entry in entries {
        if !acceptable_bundle_entry(&entry) {
            skipped += 1;
            continue;
        }
        let id = entry
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match lessons
            .iter_mut()
            .find(|existing| existing.get("id").and_then(Value::as_str) == Some(id.as_str()))
        {
            Some(slot) => *slot = entry,
            None => lessons.push(entry),
        }
        imported += 1;
    }

    if let Err(e) = db::store_lessons(conn, &lessons) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "imported": imported, "skipped": skipped }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lesson.export" => Some(handle_lesson_export(state, req)),
        "lesson.import" => Some(handle_lesson_import(state, req)),
        "workspace.exportBundle" => Some(handle_bundle_export(state, req)),
        "workspace.importBundle" => Some(handle_bundle_import(state, req)),
        _ => None,
    }
}
