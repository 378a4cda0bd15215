//! Single-lesson file exchange: export to a standalone `.json` file and the
//! guarded import path that turns an untrusted file back into a typed,
//! sanitized lesson.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;

use crate::model::Lesson;
use crate::schema::validate_lesson_structure;
use crate::security::{sanitize_json, sanitize_lesson, sanitize_text, validate_file_size, MAX_FILE_BYTES};

pub const IMPORT_TIMEOUT: Duration = Duration::from_secs(10);

const FILENAME_TITLE_LENGTH: usize = 50;
const FALLBACK_FILENAME_STEM: &str = "lesson";

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("only .json files can be imported")]
    BadExtension,
    #[error("file exceeds the 5 MiB import limit")]
    TooLarge,
    #[error("timed out reading file after 10 seconds")]
    Timeout,
    #[error("failed to read file: {0}")]
    Read(String),
    #[error("invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("file parsed as JSON but is not a valid lesson")]
    InvalidStructure,
}

impl ImportError {
    /// Stable code surfaced through the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadExtension => "bad_extension",
            Self::TooLarge => "too_large",
            Self::Timeout => "timeout",
            Self::Read(_) => "read_failed",
            Self::InvalidJson(_) => "invalid_json",
            Self::InvalidStructure => "invalid_structure",
        }
    }
}

/// Builds `{sanitized-title-or-"lesson"}-{YYYY-MM-DD}.json`. Every char
/// outside `[A-Za-z0-9-]` in the title component becomes `_`, so a hostile
/// title cannot smuggle path separators or control characters into a
/// download name.
pub fn build_export_filename(title: &str, date: NaiveDate) -> String {
    let cleaned = sanitize_text(title, FILENAME_TITLE_LENGTH);
    let stem: String = cleaned
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.chars().all(|c| c == '_') || stem.is_empty() {
        FALLBACK_FILENAME_STEM.to_string()
    } else {
        stem
    };
    format!("{}-{}.json", stem, date.format("%Y-%m-%d"))
}

/// Writes the lesson as pretty-printed UTF-8 JSON into `out_dir` and
/// returns the full path of the created file.
pub fn export_lesson_to_json(lesson: &Lesson, out_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create directory {}", out_dir.to_string_lossy()))?;

    let filename = build_export_filename(&lesson.title, chrono::Local::now().date_naive());
    let path = out_dir.join(filename);
    let json = serde_json::to_string_pretty(lesson).context("failed to serialize lesson")?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(path)
}

/// Reads the file on a helper thread so a stalled read cannot wedge the
/// request loop. A result arriving after the deadline lands in a dropped
/// channel and is discarded; the timeout cannot resolve twice.
fn read_with_timeout(path: &Path, timeout: Duration) -> Result<String, ImportError> {
    let (tx, rx) = mpsc::channel();
    let path = path.to_path_buf();
    thread::spawn(move || {
        let _ = tx.send(std::fs::read_to_string(&path));
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ImportError::Read(e.to_string())),
        Err(_) => Err(ImportError::Timeout),
    }
}

/// Imports a lesson from an untrusted `.json` file.
///
/// The order is load-bearing: pollution keys are stripped before any
/// structural trust is granted, and field-level sanitization runs only
/// after the structure is confirmed.
pub fn import_lesson_from_json(path: &Path) -> Result<Lesson, ImportError> {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    if !name.to_ascii_lowercase().ends_with(".json") {
        return Err(ImportError::BadExtension);
    }

    let byte_len = std::fs::metadata(path)
        .map_err(|e| ImportError::Read(e.to_string()))?
        .len();
    if !validate_file_size(byte_len) {
        return Err(ImportError::TooLarge);
    }

    let text = read_with_timeout(path, IMPORT_TIMEOUT)?;
    if text.len() as u64 > MAX_FILE_BYTES {
        return Err(ImportError::TooLarge);
    }

    let parsed: Value =
        serde_json::from_str(&text).map_err(|e| ImportError::InvalidJson(e.to_string()))?;
    let clean = sanitize_json(&parsed);
    if !validate_lesson_structure(&clean) {
        return Err(ImportError::InvalidStructure);
    }
    let lesson: Lesson =
        serde_json::from_value(clean).map_err(|_| ImportError::InvalidStructure)?;
    Ok(sanitize_lesson(lesson))
}
