use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::migrate::{
    collection_stats, is_migration_needed, merge_migrated_lessons, migrate_stored_lessons,
};
use rusqlite::Connection;
use serde_json::{json, Value};

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Orchestrates read -> migrate -> merge -> write over the collection key.
/// Nothing to migrate is success, not failure; a failed save or any
/// per-entry error turns the report unsuccessful.
fn handle_migration_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let raw = match db::kv_get(conn, db::LESSONS_KEY) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let Some(raw) = raw else {
        return ok(
            &req.id,
            json!({ "success": true, "migratedCount": 0, "errors": [] }),
        );
    };

    let outcome = migrate_stored_lessons(&raw);
    let errors: Vec<Value> = outcome
        .errors
        .iter()
        .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
        .collect();

    if outcome.migrated.is_empty() {
        return ok(
            &req.id,
            json!({
                "success": outcome.errors.is_empty(),
                "migratedCount": 0,
                "errors": errors,
            }),
        );
    }

    let merged = match merge_migrated_lessons(Some(&raw), &outcome.migrated) {
        Ok(v) => v,
        Err(e) => {
            return ok(
                &req.id,
                json!({
                    "success": false,
                    "migratedCount": 0,
                    "errors": errors,
                    "saveError": e.to_string(),
                }),
            )
        }
    };
    if let Err(e) = db::kv_set(conn, db::LESSONS_KEY, &merged) {
        return ok(
            &req.id,
            json!({
                "success": false,
                "migratedCount": 0,
                "errors": errors,
                "saveError": e.to_string(),
            }),
        );
    }

    tracing::info!(
        migrated = outcome.migrated.len(),
        skipped = outcome.already_migrated,
        failed = outcome.errors.len(),
        "lesson migration finished"
    );
    ok(
        &req.id,
        json!({
            "success": outcome.errors.is_empty(),
            "migratedCount": outcome.migrated.len(),
            "errors": errors,
        }),
    )
}

fn handle_migration_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let raw = match db::kv_get(conn, db::LESSONS_KEY) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let stats = collection_stats(raw.as_deref());
    match serde_json::to_value(stats) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_migration_check(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let raw = match db::kv_get(conn, db::LESSONS_KEY) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({ "migrationNeeded": is_migration_needed(raw.as_deref()) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "migration.run" => Some(handle_migration_run(state, req)),
        "migration.stats" => Some(handle_migration_stats(state, req)),
        "migration.check" => Some(handle_migration_check(state, req)),
        _ => None,
    }
}
