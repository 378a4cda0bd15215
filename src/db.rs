use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Collection key: a single JSON array of lesson documents, mixed v1/v2
/// until migration runs. Writes are whole-value overwrites.
pub const LESSONS_KEY: &str = "lessons";

pub fn autosave_key(lesson_id: &str) -> String {
    format!("autosave.{}", lesson_id)
}

pub fn progress_key(lesson_id: &str) -> String {
    format!("progress.{}", lesson_id)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("planbook.sqlite3");
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // Workspaces created before the timestamp column need it added.
    ensure_kv_updated_at(&conn)?;

    Ok(conn)
}

fn ensure_kv_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "kv", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE kv ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

pub fn kv_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(value)
}

pub fn kv_set(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO kv(key, value, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        (key, value, now_ts()),
    )?;
    Ok(())
}

pub fn kv_remove(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM kv WHERE key = ?", [key])?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
    match kv_get(conn, key)? {
        None => Ok(None),
        Some(raw) => Ok(serde_json::from_str(&raw).ok()),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    kv_set(conn, key, &serde_json::to_string(value)?)
}

/// Loads the lesson collection. A missing or unparseable blob reads as an
/// empty collection; read paths never fail on corrupt storage.
pub fn load_lessons(conn: &Connection) -> anyhow::Result<Vec<Value>> {
    match kv_get(conn, LESSONS_KEY)? {
        None => Ok(Vec::new()),
        Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
    }
}

pub fn store_lessons(conn: &Connection, lessons: &[Value]) -> anyhow::Result<()> {
    kv_set(conn, LESSONS_KEY, &serde_json::to_string(lessons)?)
}
