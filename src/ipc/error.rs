use serde_json::json;

use crate::exchange::ImportError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Import failures keep their cause-specific code so the frontend can give
/// different retry guidance per kind.
pub fn import_err(id: &str, e: &ImportError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), None)
}
