use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    is_activity_lesson, ActivityLesson, LeadIn, Lesson, Methodology, PracticeKind,
    PracticeSection, Presentation,
};
use crate::schema::validate_lesson_structure;
use crate::security::{sanitize_json, sanitize_lesson};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

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

/// Runs an incoming v1 lesson object through the same gate as file import:
/// pollution strip, structural check, typed decode, field sanitization.
pub(super) fn gate_phase_lesson(raw: &Value) -> Result<Lesson, String> {
    let clean = sanitize_json(raw);
    if !validate_lesson_structure(&clean) {
        return Err("value is not a valid lesson".to_string());
    }
    let lesson: Lesson =
        serde_json::from_value(clean).map_err(|_| "value is not a valid lesson".to_string())?;
    Ok(sanitize_lesson(lesson))
}

/// Whole-document upsert by id into the collection.
pub(super) fn upsert_lesson(conn: &Connection, id: &str, doc: Value) -> anyhow::Result<()> {
    let mut lessons = db::load_lessons(conn)?;
    match lessons
        .iter_mut()
        .find(|entry| entry.get("id").and_then(Value::as_str) == Some(id))
    {
        Some(slot) => *slot = doc,
        None => lessons.push(doc),
    }
    db::store_lessons(conn, &lessons)
}

pub(super) fn find_lesson(conn: &Connection, id: &str) -> anyhow::Result<Option<Value>> {
    let lessons = db::load_lessons(conn)?;
    Ok(lessons
        .into_iter()
        .find(|entry| entry.get("id").and_then(Value::as_str) == Some(id)))
}

fn handle_lesson_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let (default_duration, default_structure, _) = super::setup::lessons_defaults(conn);
    let structure_tag = req
        .params
        .get("structure")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_ascii_lowercase())
        .unwrap_or(default_structure);
    let Some(structure) = Methodology::parse(&structure_tag) else {
        return err(
            &req.id,
            "bad_params",
            "structure must be one of: ppp, ttt, tbl, esa",
            None,
        );
    };
    let title = req
        .params
        .get("title")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Untitled lesson".to_string());

    let lesson = Lesson {
        id: Uuid::new_v4().to_string(),
        title,
        structure,
        lead_in: LeadIn::default(),
        presentation: Presentation::default(),
        controlled_practice: PracticeSection::empty(PracticeKind::Controlled),
        free_practice: PracticeSection::empty(PracticeKind::Free),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        level: None,
        objectives: Vec::new(),
        materials: Vec::new(),
        cefr_level: None,
        duration: Some(default_duration as u32),
    };
    let lesson = sanitize_lesson(lesson);

    match serde_json::to_value(&lesson) {
        Ok(value) => ok(&req.id, json!({ "lesson": value })),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_lesson_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("lesson") else {
        return err(&req.id, "bad_params", "missing lesson", None);
    };

    let (id, doc, version) = if is_activity_lesson(raw) {
        let clean = sanitize_json(raw);
        match serde_json::from_value::<ActivityLesson>(clean) {
            Ok(lesson) => {
                let value = match serde_json::to_value(&lesson) {
                    Ok(v) => v,
                    Err(e) => return err(&req.id, "internal", e.to_string(), None),
                };
                (lesson.id, value, 2)
            }
            Err(_) => {
                return err(
                    &req.id,
                    "invalid_structure",
                    "value is not a valid activity lesson",
                    None,
                )
            }
        }
    } else {
        match gate_phase_lesson(raw) {
            Ok(lesson) => {
                let value = match serde_json::to_value(&lesson) {
                    Ok(v) => v,
                    Err(e) => return err(&req.id, "internal", e.to_string(), None),
                };
                (lesson.id, value, 1)
            }
            Err(msg) => return err(&req.id, "invalid_structure", msg, None),
        }
    };

    if let Err(e) = upsert_lesson(conn, &id, doc) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::debug!(lesson = %id, version, "lesson saved");
    ok(&req.id, json!({ "id": id, "version": version }))
}

fn handle_lesson_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match find_lesson(conn, &id) {
        Ok(Some(lesson)) => {
            let version = if is_activity_lesson(&lesson) { 2 } else { 1 };
            ok(&req.id, json!({ "lesson": lesson, "version": version }))
        }
        Ok(None) => err(&req.id, "not_found", format!("no lesson with id {}", id), None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_lesson_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let lessons = match db::load_lessons(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let summaries: Vec<Value> = lessons
        .iter()
        .map(|entry| {
            json!({
                "id": entry.get("id").cloned().unwrap_or(Value::Null),
                "title": entry.get("title").cloned().unwrap_or(Value::Null),
                "version": if is_activity_lesson(entry) { 2 } else { 1 },
                "createdAt": entry.get("createdAt").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    ok(&req.id, json!({ "lessons": summaries }))
}

fn handle_lesson_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut lessons = match db::load_lessons(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let before = lessons.len();
    lessons.retain(|entry| entry.get("id").and_then(Value::as_str) != Some(id.as_str()));
    let deleted = lessons.len() < before;

    if deleted {
        if let Err(e) = db::store_lessons(conn, &lessons) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
        // Removal is whole-document: drop the side keys with it.
        let _ = db::kv_remove(conn, &db::autosave_key(&id));
        let _ = db::kv_remove(conn, &db::progress_key(&id));
    }
    ok(&req.id, json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lesson.create" => Some(handle_lesson_create(state, req)),
        "lesson.save" => Some(handle_lesson_save(state, req)),
        "lesson.get" => Some(handle_lesson_get(state, req)),
        "lesson.list" => Some(handle_lesson_list(state, req)),
        "lesson.delete" => Some(handle_lesson_delete(state, req)),
        _ => None,
    }
}
