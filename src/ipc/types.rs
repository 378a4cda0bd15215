use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line on stdin. Responses echo `id` so the frontend can
/// correlate them.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
        }
    }
}
