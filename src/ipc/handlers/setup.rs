use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::Methodology;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Lessons,
    Sharing,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "lessons" => Some(Self::Lessons),
            "sharing" => Some(Self::Sharing),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Lessons => "setup.lessons",
            Self::Sharing => "setup.sharing",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Lessons => json!({
            "defaultDurationMinutes": 45,
            "defaultStructure": "ppp",
            "autosaveIntervalSeconds": 30
        }),
        SetupSection::Sharing => json!({
            "defaultMode": "student",
            "allowStudentProgress": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Lessons => match k.as_str() {
                "defaultDurationMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 5, 240)?));
                }
                "defaultStructure" => {
                    let tag = v
                        .as_str()
                        .map(|s| s.trim().to_ascii_lowercase())
                        .ok_or_else(|| format!("{} must be string", k))?;
                    if Methodology::parse(&tag).is_none() {
                        return Err(
                            "defaultStructure must be one of: ppp, ttt, tbl, esa".to_string()
                        );
                    }
                    obj.insert(k.clone(), Value::String(tag));
                }
                "autosaveIntervalSeconds" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 5, 600)?));
                }
                _ => return Err(format!("unknown lessons field: {}", k)),
            },
            SetupSection::Sharing => match k.as_str() {
                "defaultMode" => {
                    let mode = v
                        .as_str()
                        .map(|s| s.trim().to_ascii_lowercase())
                        .ok_or_else(|| format!("{} must be string", k))?;
                    if mode != "teacher" && mode != "student" {
                        return Err("defaultMode must be one of: teacher, student".to_string());
                    }
                    obj.insert(k.clone(), Value::String(mode));
                }
                "allowStudentProgress" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown sharing field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values should not block setup.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

pub(super) fn lessons_defaults(conn: &rusqlite::Connection) -> (i64, String, i64) {
    let section = load_section(conn, SetupSection::Lessons).unwrap_or_else(|_| default_section(SetupSection::Lessons));
    let duration = section
        .get("defaultDurationMinutes")
        .and_then(Value::as_i64)
        .unwrap_or(45);
    let structure = section
        .get("defaultStructure")
        .and_then(Value::as_str)
        .unwrap_or("ppp")
        .to_string();
    let autosave = section
        .get("autosaveIntervalSeconds")
        .and_then(Value::as_i64)
        .unwrap_or(30);
    (duration, structure, autosave)
}

pub(super) fn sharing_defaults(conn: &rusqlite::Connection) -> (String, bool) {
    let section = load_section(conn, SetupSection::Sharing).unwrap_or_else(|_| default_section(SetupSection::Sharing));
    let mode = section
        .get("defaultMode")
        .and_then(Value::as_str)
        .unwrap_or("student")
        .to_string();
    let allow_progress = section
        .get("allowStudentProgress")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    (mode, allow_progress)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let lessons = match load_section(conn, SetupSection::Lessons) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let sharing = match load_section(conn, SetupSection::Sharing) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "lessons": lessons, "sharing": sharing }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
